//! Demand arithmetic on atomic counters.
//!
//! A demand counter saturates at [`UNBOUNDED`]; once there it is never
//! decremented again. Subtracting more than is available never wraps: callers
//! get the shortfall back and decide how to report it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel demand meaning "emit without limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Adds two demands, saturating at [`UNBOUNDED`].
#[inline]
pub fn add_cap(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

/// Atomically adds `n` to `counter`, saturating at [`UNBOUNDED`].
///
/// Returns the previous value.
pub fn get_and_add_cap(counter: &AtomicU64, n: u64) -> u64 {
    let mut current = counter.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = add_cap(current, n);
        match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(prev) => return prev,
            Err(actual) => current = actual,
        }
    }
}

/// Atomically removes `n` units of demand.
///
/// - `Ok(remaining)` on success; an unbounded counter stays unbounded.
/// - `Err(available)` if fewer than `n` units were available; the counter is
///   left untouched.
pub fn consume(counter: &AtomicU64, n: u64) -> Result<u64, u64> {
    let mut current = counter.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return Ok(UNBOUNDED);
        }
        if current < n {
            return Err(current);
        }
        match counter.compare_exchange_weak(
            current,
            current - n,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return Ok(current - n),
            Err(actual) => current = actual,
        }
    }
}

/// Atomically subtracts `n`, stopping at zero. Unbounded stays unbounded.
///
/// Returns the new value.
pub fn sub_saturating(counter: &AtomicU64, n: u64) -> u64 {
    let mut current = counter.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_sub(n);
        match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_saturates_at_unbounded() {
        let c = AtomicU64::new(UNBOUNDED - 2);
        assert_eq!(get_and_add_cap(&c, 10), UNBOUNDED - 2);
        assert_eq!(c.load(Ordering::Acquire), UNBOUNDED);
        assert_eq!(get_and_add_cap(&c, 1), UNBOUNDED);
    }

    #[test]
    fn test_consume_reports_shortfall_without_wrapping() {
        let c = AtomicU64::new(1);
        assert_eq!(consume(&c, 1), Ok(0));
        assert_eq!(consume(&c, 1), Err(0));
        assert_eq!(c.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_unbounded_is_never_decremented() {
        let c = AtomicU64::new(UNBOUNDED);
        assert_eq!(consume(&c, 5), Ok(UNBOUNDED));
        assert_eq!(sub_saturating(&c, 5), UNBOUNDED);
        assert_eq!(c.load(Ordering::Acquire), UNBOUNDED);
    }

    #[test]
    fn test_sub_saturating_stops_at_zero() {
        let c = AtomicU64::new(3);
        assert_eq!(sub_saturating(&c, 5), 0);
    }

    #[test]
    fn test_concurrent_adds_sum_exactly() {
        let c = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        get_and_add_cap(&c, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.load(Ordering::Acquire), 4000);
    }
}
