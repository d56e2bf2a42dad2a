//! # Retry policy for immediate resubscription.
//!
//! [`RetryPolicy`] decides whether [`RetryOperator`](crate::RetryOperator)
//! resubscribes after the `n`-th error (1-based) or gives up and propagates it.
//!
//! ```text
//! exhausted = max_retries is Some(m) and n > m
//!           | max_retries is None  and a matcher exists
//! propagate = exhausted and (no matcher or matcher(error) == false)
//! ```
//!
//! | Policy                  | Behavior                                               |
//! |-------------------------|--------------------------------------------------------|
//! | `unbounded()`           | retries forever                                        |
//! | `times(n)`              | `n` retries, then the error propagates                 |
//! | `when(pred)`            | retries while `pred(error)` holds                      |
//! | `times_when(n, pred)`   | `n` retries, then keeps retrying while `pred` holds    |
//!
//! An unbounded policy against a source that always fails loops forever;
//! callers choose sane policies.

use std::fmt;
use std::sync::Arc;

use crate::error::FlowError;

type Matcher = Arc<dyn Fn(&FlowError) -> bool + Send + Sync>;

/// Policy controlling immediate resubscription after an error.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: Option<u64>,
    matcher: Option<Matcher>,
}

impl RetryPolicy {
    /// Retries every error, forever.
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            matcher: None,
        }
    }

    /// Retries at most `n` times.
    pub fn times(n: u64) -> Self {
        Self {
            max_retries: Some(n),
            matcher: None,
        }
    }

    /// Retries while `pred` accepts the error.
    pub fn when(pred: impl Fn(&FlowError) -> bool + Send + Sync + 'static) -> Self {
        Self {
            max_retries: None,
            matcher: Some(Arc::new(pred)),
        }
    }

    /// Retries `n` times unconditionally, then while `pred` accepts the error.
    pub fn times_when(n: u64, pred: impl Fn(&FlowError) -> bool + Send + Sync + 'static) -> Self {
        Self {
            max_retries: Some(n),
            matcher: Some(Arc::new(pred)),
        }
    }

    pub fn max_retries(&self) -> Option<u64> {
        self.max_retries
    }

    /// Whether the `attempt`-th error (1-based) should trigger a resubscription.
    pub fn should_retry(&self, attempt: u64, error: &FlowError) -> bool {
        let exhausted = match self.max_retries {
            Some(max) => attempt > max,
            None => self.matcher.is_some(),
        };
        if !exhausted {
            return true;
        }
        self.matcher.as_ref().is_some_and(|m| m(error))
    }
}

impl Default for RetryPolicy {
    /// Returns [`RetryPolicy::unbounded`].
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("matcher", &self.matcher.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
