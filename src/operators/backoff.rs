//! # Timed backoff companion.
//!
//! [`TimedBackoff`] turns a stream of errors into a stream of retry signals:
//! the `k`-th error is answered with the value `k` after
//! [`BackoffPolicy::next`]`(k - 1)`; the error after the last allowed retry
//! completes the stream instead. Plugged into a
//! [`RetryWhenOperator`](crate::RetryWhenOperator), completion means
//! "stop retrying and complete downstream".
//!
//! ```text
//! errors:  ──e1────────────e2──────────────e3──
//! signals: ─────(d0)──1─────────(d1)──2────|      (max_retries = 2)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::FlowError;
use crate::events::{Bus, Event, EventKind};
use crate::flow::{Publisher, PublisherRef, SubscriberRef};
use crate::policies::BackoffPolicy;
use crate::subscriber::{DemandSubscriber, Strategy};
use crate::timer::{TimerHandle, TimerRef};

/// Error stream mapped to delayed retry signals.
pub struct TimedBackoff {
    errors: PublisherRef<FlowError>,
    policy: BackoffPolicy,
    max_retries: u64,
    timer: TimerRef,
    bus: Option<Bus>,
}

impl TimedBackoff {
    pub fn new(
        errors: PublisherRef<FlowError>,
        policy: BackoffPolicy,
        max_retries: u64,
        timer: TimerRef,
    ) -> Self {
        Self {
            errors,
            policy,
            max_retries,
            timer,
            bus: None,
        }
    }

    /// Publishes `BackoffScheduled`/`BackoffExhausted` events to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }
}

impl Publisher<u64> for TimedBackoff {
    fn subscribe(&self, subscriber: SubscriberRef<u64>) {
        let core = DemandSubscriber::new(
            subscriber,
            Backoff {
                policy: self.policy,
                max_retries: self.max_retries,
                timer: Arc::clone(&self.timer),
                seen: AtomicU64::new(0),
                scheduled: Mutex::new(Vec::new()),
                bus: self.bus.clone(),
            },
        );
        core.connect(&self.errors);
    }
}

/// Companion factory for [`RetryWhenOperator`](crate::RetryWhenOperator).
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use pullstream::{from_iter, retry_backoff, BackoffPolicy, ManualTimer, RetryWhenOperator};
///
/// let timer = Arc::new(ManualTimer::new());
/// let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(5));
/// let op = RetryWhenOperator::new(from_iter([1u32, 2]), retry_backoff(policy, 3, timer));
/// # let _ = op;
/// ```
pub fn retry_backoff(
    policy: BackoffPolicy,
    max_retries: u64,
    timer: TimerRef,
) -> impl Fn(PublisherRef<FlowError>) -> PublisherRef<u64> + Send + Sync + 'static {
    move |errors| Arc::new(TimedBackoff::new(errors, policy, max_retries, Arc::clone(&timer)))
}

struct Backoff {
    policy: BackoffPolicy,
    max_retries: u64,
    timer: TimerRef,
    seen: AtomicU64,
    scheduled: Mutex<Vec<TimerHandle>>,
    bus: Option<Bus>,
}

impl Backoff {
    fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event.with_operator("timed_backoff"));
        }
    }
}

impl Strategy<FlowError, u64> for Backoff {
    fn on_next(&self, core: &DemandSubscriber<FlowError, u64, Self>, error: FlowError) {
        let attempt = self.seen.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt > self.max_retries {
            debug!(attempt, error = %error, "backoff exhausted");
            self.publish(
                Event::new(EventKind::BackoffExhausted)
                    .with_attempt(attempt)
                    .with_reason(error.to_string()),
            );
            core.finish();
            return;
        }

        let index = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.policy.next(index);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry signal");
        self.publish(
            Event::new(EventKind::BackoffScheduled)
                .with_attempt(attempt)
                .with_delay(delay)
                .with_reason(error.to_string()),
        );

        let weak = core.downgrade();
        let handle = self.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.emit_next(attempt);
                }
            }),
        );
        let mut scheduled = self.scheduled.lock();
        scheduled.retain(|h| !h.is_finished());
        scheduled.push(handle);
    }

    fn on_dispose(&self, _core: &DemandSubscriber<FlowError, u64, Self>) {
        for handle in self.scheduled.lock().drain(..) {
            handle.cancel();
        }
    }

    fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    fn name(&self) -> &'static str {
        "timed_backoff"
    }
}
