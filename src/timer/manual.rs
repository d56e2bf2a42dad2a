//! Deterministic timer driven by the caller.
//!
//! Time only moves when [`ManualTimer::advance`] is called. Due tasks run on
//! the calling thread in deadline order (ties in scheduling order), and tasks
//! they schedule run in the same call if they fall inside the window.

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Timer, TimerHandle, TimerTask};

struct Scheduled {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: TimerTask,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    seq: u64,
    queue: Vec<Scheduled>,
}

/// Fake clock for tests.
#[derive(Default)]
pub struct ManualTimer {
    clock: Mutex<Clock>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of scheduled, non-cancelled tasks.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .queue
            .iter()
            .filter(|s| !s.handle.is_cancelled())
            .count()
    }

    /// Moves the clock forward by `by`, running every task that falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;
        while let Some(next) = self.pop_due(target) {
            next.handle.fire(next.task);
        }
        self.clock.lock().now = target;
    }

    fn pop_due(&self, target: Duration) -> Option<Scheduled> {
        let mut clock = self.clock.lock();
        let index = clock
            .queue
            .iter()
            .enumerate()
            .filter(|(_, s)| s.due <= target)
            .min_by_key(|(_, s)| (s.due, s.seq))
            .map(|(i, _)| i)?;
        let next = clock.queue.swap_remove(index);
        clock.now = clock.now.max(next.due);
        Some(next)
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new(CancellationToken::new());
        let mut clock = self.clock.lock();
        let seq = clock.seq;
        clock.seq += 1;
        let due = clock.now + delay;
        clock.queue.push(Scheduled {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;

    fn record(log: &Arc<PlMutex<Vec<&'static str>>>, tag: &'static str) -> TimerTask {
        let log = Arc::clone(log);
        Box::new(move || log.lock().push(tag))
    }

    #[test]
    fn test_runs_in_deadline_order() {
        let timer = ManualTimer::new();
        let log = Arc::new(PlMutex::new(Vec::new()));
        timer.schedule(Duration::from_millis(30), record(&log, "c"));
        timer.schedule(Duration::from_millis(10), record(&log, "a"));
        timer.schedule(Duration::from_millis(10), record(&log, "b"));

        timer.advance(Duration::from_millis(20));
        assert_eq!(*log.lock(), vec!["a", "b"]);
        timer.advance(Duration::from_millis(10));
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(timer.now(), Duration::from_millis(30));
    }

    #[test]
    fn test_cancelled_tasks_are_skipped() {
        let timer = ManualTimer::new();
        let log = Arc::new(PlMutex::new(Vec::new()));
        let h = timer.schedule(Duration::from_millis(5), record(&log, "x"));
        h.cancel();
        assert_eq!(timer.pending(), 0);
        timer.advance(Duration::from_secs(1));
        assert!(log.lock().is_empty());
        assert!(h.is_finished());
    }

    #[test]
    fn test_handle_finishes_once_task_ran() {
        let timer = ManualTimer::new();
        let log = Arc::new(PlMutex::new(Vec::new()));
        let h = timer.schedule(Duration::from_millis(5), record(&log, "x"));
        assert!(!h.is_finished());

        timer.advance(Duration::from_millis(5));
        assert_eq!(*log.lock(), vec!["x"]);
        assert!(h.is_finished());
        assert!(!h.is_cancelled());
    }

    #[test]
    fn test_tasks_scheduled_while_advancing_run_in_window() {
        let timer = Arc::new(ManualTimer::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let t = Arc::clone(&timer);
        let l = Arc::clone(&log);
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                l.lock().push("first");
                t.schedule(Duration::from_millis(10), record(&l, "second"));
            }),
        );

        timer.advance(Duration::from_millis(25));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }
}
