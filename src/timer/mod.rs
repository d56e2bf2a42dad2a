//! Injected timers for backoff and throttling.
//!
//! Operators that wait never reach for a global clock: they receive a
//! [`TimerRef`] at construction.
//!
//! ## Contents
//! - [`Timer`] scheduling contract, [`TimerHandle`] cancellable ticket
//! - [`TokioTimer`] production timer on a tokio runtime
//! - [`ManualTimer`] deterministic fake clock for tests

mod manual;
mod runtime;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use manual::ManualTimer;
pub use runtime::TokioTimer;

/// One-shot task run by a [`Timer`].
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a [`Timer`].
pub type TimerRef = Arc<dyn Timer>;

/// Runs tasks after a delay.
pub trait Timer: Send + Sync {
    /// Schedules `task` to run once after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Ticket for a scheduled task. Dropping it does not cancel the task.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            token,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs `task` unless the handle was cancelled first.
    pub(crate) fn fire(&self, task: TimerTask) {
        if self.token.is_cancelled() {
            return;
        }
        self.fired.store(true, Ordering::Release);
        task();
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has run or can no longer run.
    pub fn is_finished(&self) -> bool {
        self.fired.load(Ordering::Acquire) || self.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}
