//! # Backoff policy for resubscription delays.
//!
//! [`BackoffPolicy`] decides how long [`TimedBackoff`](crate::TimedBackoff)
//! waits before signalling the next resubscription. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay before the first retry;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the cap.
//!
//! The delay for retry `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jittered. The base is derived from the retry index alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use pullstream::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::exponential(Duration::from_millis(50), Duration::from_secs(1));
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(50));
//! assert_eq!(backoff.next(2), Duration::from_millis(200));
//! assert_eq!(backoff.next(10), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Resubscription backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `factor = 1.0` (constant delay);
    /// - `first = 100ms`;
    /// - `max = 30s`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay of `delay` for every retry.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Doubling delays starting at `first`, capped at `max`.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Replaces the jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay for the given retry index (0-indexed).
    ///
    /// # Notes
    /// - `factor < 1.0` makes delays shrink (not typical).
    /// - Non-finite or negative intermediate values clamp to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exponent);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_sequence() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30));
        let delays: Vec<_> = (0..5).map(|n| policy.next(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
    }

    #[test]
    fn test_fixed_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(250));
        for attempt in [0, 1, 7, 1000] {
            assert_eq!(policy.next(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_overflowing_exponent_clamps_to_max() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
            .with_jitter(JitterPolicy::Equal);
        for attempt in 0..12 {
            let base = (100.0 * 2.0f64.powi(attempt as i32)).min(30_000.0) as u64;
            let delay = policy.next(attempt);
            assert!(delay >= Duration::from_millis(base / 2), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_millis(base), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_decorrelated_never_below_first() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
            .with_jitter(JitterPolicy::Decorrelated);
        for _ in 0..50 {
            let delay = policy.next(6);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
