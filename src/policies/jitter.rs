//! # Jitter policy for backoff delays.
//!
//! [`JitterPolicy`] spreads resubscriptions of many pipelines failing at the
//! same moment (a shared upstream going down) so they do not hammer the
//! source in lockstep.
//!
//! - [`JitterPolicy::None`] exact delays
//! - [`JitterPolicy::Full`] `random[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] `random[base, prev × 3]`, capped at max

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact delay. Predictable; good for tests.
    #[default]
    None,

    /// Random delay in `[0, delay]`. Most aggressive spreading.
    Full,

    /// `delay/2 + random[0, delay/2]`. Keeps about 75% of the delay on average.
    Equal,

    /// Random delay in `[base, prev × 3]`, capped at `max`.
    ///
    /// Needs context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
        }
    }

    /// Applies decorrelated jitter given the floor, previous delay and cap.
    ///
    /// Other policies fall back to [`apply`](Self::apply) on `prev`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }
        let base_ms = base.as_millis() as u64;
        let upper = prev
            .as_millis()
            .saturating_mul(3)
            .min(max.as_millis()) as u64;
        let upper = upper.max(base_ms);
        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return Duration::from_millis(ms);
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}
