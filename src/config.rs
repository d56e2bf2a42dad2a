//! # Runtime configuration.
//!
//! Provides [`Config`], the shared knobs for prefetch windows and the event bus.
//!
//! Config is consumed by:
//! 1. **Zip**: `Zip::with_config(&config)` picks the per-source prefetch.
//! 2. **Bounded consumers**: `BoundedSubscriber::from_config(&config, sink)`.
//! 3. **Event bus**: `Bus::from_config(&config)`.
//!
//! ## Sentinel values
//! - `bounded_limit = 0` → `bounded_capacity / 4`
//! - `prefetch = 0` / `bounded_capacity = 0` / `bus_capacity = 0` → clamped to 1

/// Shared configuration for operators that prefetch.
///
/// ## Field semantics
/// - `prefetch`: per-source buffer of the zip barrier (min 1)
/// - `bounded_capacity`: window requested up front by bounded consumers (min 1)
/// - `bounded_limit`: low-water mark that triggers a refill (`0` = capacity/4)
/// - `bus_capacity`: event bus ring buffer size (min 1)
///
/// ## Notes
/// All fields are public. Prefer the accessors, which resolve the sentinels.
#[derive(Clone, Debug)]
pub struct Config {
    /// Items each zip source may buffer ahead of the slowest sibling.
    pub prefetch: usize,

    /// Items a bounded consumer keeps in flight.
    pub bounded_capacity: usize,

    /// Outstanding count at or below which a bounded consumer refills.
    ///
    /// - `0` = a quarter of `bounded_capacity`
    /// - values `>= bounded_capacity` are clamped to `bounded_capacity - 1`
    pub bounded_limit: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the zip prefetch clamped to a minimum of 1.
    #[inline]
    pub fn prefetch_clamped(&self) -> usize {
        self.prefetch.max(1)
    }

    /// Returns the bounded window clamped to a minimum of 1.
    #[inline]
    pub fn bounded_capacity_clamped(&self) -> usize {
        self.bounded_capacity.max(1)
    }

    /// Returns the effective refill limit for bounded consumers.
    #[inline]
    pub fn bounded_limit_resolved(&self) -> usize {
        let capacity = self.bounded_capacity_clamped();
        if self.bounded_limit == 0 {
            capacity / 4
        } else {
            self.bounded_limit.min(capacity - 1)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `prefetch = 32`
    /// - `bounded_capacity = 256`
    /// - `bounded_limit = 0` (capacity/4)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            prefetch: 32,
            bounded_capacity: 256,
            bounded_limit: 0,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_is_quarter_of_capacity() {
        let cfg = Config::default();
        assert_eq!(cfg.bounded_limit_resolved(), 64);
        assert_eq!(cfg.prefetch_clamped(), 32);
    }

    #[test]
    fn test_sentinels_are_clamped() {
        let cfg = Config {
            prefetch: 0,
            bounded_capacity: 0,
            bounded_limit: 10,
            bus_capacity: 0,
        };
        assert_eq!(cfg.prefetch_clamped(), 1);
        assert_eq!(cfg.bounded_capacity_clamped(), 1);
        assert_eq!(cfg.bounded_limit_resolved(), 0);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn test_explicit_limit_is_kept_below_capacity() {
        let cfg = Config {
            bounded_capacity: 16,
            bounded_limit: 12,
            ..Config::default()
        };
        assert_eq!(cfg.bounded_limit_resolved(), 12);

        let cfg = Config {
            bounded_capacity: 16,
            bounded_limit: 40,
            ..Config::default()
        };
        assert_eq!(cfg.bounded_limit_resolved(), 15);
    }
}
