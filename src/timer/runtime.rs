//! Timer backed by a tokio runtime.
//!
//! Each scheduled task is a spawned future racing the delay against its
//! cancellation token:
//! ```text
//! select! {
//!     token.cancelled()  → drop task
//!     sleep(delay)       → run task
//! }
//! ```

use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{Timer, TimerHandle, TimerTask};

/// [`Timer`] that spawns onto a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    /// Timer spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Timer on the runtime of the calling context, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new(CancellationToken::new());
        let ticket = handle.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = ticket.token().cancelled() => {}
                _ = tokio::time::sleep(delay) => ticket.fire(task),
            }
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let timer = TokioTimer::try_current().expect("inside runtime");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = timer.schedule(
            Duration::from_millis(100),
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let timer = TokioTimer::try_current().expect("inside runtime");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }
}
