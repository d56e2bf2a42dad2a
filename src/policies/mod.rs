//! Retry and backoff policies.
//!
//! This module groups the knobs that control **whether** an operator
//! resubscribes after an error and **how long** it waits first.
//!
//! ## Contents
//! - [`RetryPolicy`]   when `RetryOperator` resubscribes (count and/or predicate)
//! - [`BackoffPolicy`] how delays evolve for `TimedBackoff` (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! RetryOperator::new(source, RetryPolicy::times(3))
//!      └─► resubscribes immediately while should_retry(attempt, &error)
//!
//! RetryWhenOperator::new(source, retry_backoff(BackoffPolicy, max_retries, timer))
//!      └─► TimedBackoff emits retry k after backoff.next(k - 1)
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
