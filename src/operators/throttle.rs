//! # Rate-limited demand.
//!
//! [`ThrottleOperator`] records downstream demand but releases it upstream
//! one item per elapsed `period`, using an injected [`Timer`](crate::Timer).
//! The tick is armed while there is demand not yet requested upstream and
//! disarms itself otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::flow::{Publisher, PublisherRef, SubscriberRef};
use crate::subscriber::{DemandSubscriber, Strategy};
use crate::timer::{TimerHandle, TimerRef};

/// Publisher asking its source for at most one item per `period`.
pub struct ThrottleOperator<T> {
    source: PublisherRef<T>,
    period: Duration,
    timer: TimerRef,
}

impl<T: Send + 'static> ThrottleOperator<T> {
    pub fn new(source: PublisherRef<T>, period: Duration, timer: TimerRef) -> Self {
        Self {
            source,
            period,
            timer,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ThrottleOperator<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let core = DemandSubscriber::new(
            subscriber,
            Throttled {
                period: self.period,
                timer: Arc::clone(&self.timer),
                armed: AtomicBool::new(false),
                tick: Mutex::new(None),
            },
        );
        core.connect(&self.source);
    }
}

struct Throttled {
    period: Duration,
    timer: TimerRef,
    armed: AtomicBool,
    tick: Mutex<Option<TimerHandle>>,
}

impl Throttled {
    fn arm<T: Send + 'static>(&self, core: &DemandSubscriber<T, T, Self>) {
        if self.armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = core.downgrade();
        let handle = self.timer.schedule(
            self.period,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.strategy().on_tick(&core);
                }
            }),
        );
        *self.tick.lock() = Some(handle);
    }

    fn on_tick<T: Send + 'static>(&self, core: &DemandSubscriber<T, T, Self>) {
        self.armed.store(false, Ordering::Release);
        if core.is_cancelled() || core.is_terminated() {
            return;
        }
        if core.requested() > core.upstream_outstanding() {
            trace!("throttle tick, releasing one item");
            core.request_upstream(1);
        }
        if core.requested() > core.upstream_outstanding() {
            self.arm(core);
        }
    }
}

impl<T: Send + 'static> Strategy<T, T> for Throttled {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
    }

    fn on_request(&self, core: &DemandSubscriber<T, T, Self>, _n: u64) {
        self.arm(core);
    }

    fn on_dispose(&self, _core: &DemandSubscriber<T, T, Self>) {
        if let Some(tick) = self.tick.lock().take() {
            tick.cancel();
        }
    }

    fn name(&self) -> &'static str {
        "throttle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualPublisher, Recorder};
    use crate::timer::ManualTimer;

    const PERIOD: Duration = Duration::from_millis(100);

    #[test]
    fn test_one_request_per_period() {
        let timer = Arc::new(ManualTimer::new());
        let source = ManualPublisher::<u32>::new();
        let op = ThrottleOperator::new(source.clone() as PublisherRef<u32>, PERIOD, timer.clone());
        let rec = Recorder::new(3);
        op.subscribe(rec.clone());

        let sub = source.subscription(0);
        assert!(sub.requests().is_empty());
        timer.advance(PERIOD);
        assert_eq!(sub.requests(), vec![1]);
        assert!(source.try_next(1));
        timer.advance(PERIOD);
        timer.advance(PERIOD);
        assert_eq!(sub.requests(), vec![1, 1, 1]);

        // Demand is covered: the tick disarms until the next request.
        assert_eq!(timer.pending(), 0);
        timer.advance(PERIOD * 5);
        assert_eq!(sub.requests().len(), 3);

        rec.request(1);
        timer.advance(PERIOD);
        assert_eq!(sub.requests(), vec![1, 1, 1, 1]);
        assert!(source.try_next(2));
        assert!(source.try_next(3));
        assert!(source.try_next(4));
        assert_eq!(rec.items(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel_disarms_tick() {
        let timer = Arc::new(ManualTimer::new());
        let source = ManualPublisher::<u32>::new();
        let op = ThrottleOperator::new(source.clone() as PublisherRef<u32>, PERIOD, timer.clone());
        let rec = Recorder::new(10);
        op.subscribe(rec.clone());

        assert_eq!(timer.pending(), 1);
        rec.cancel();
        assert_eq!(timer.pending(), 0);
        timer.advance(PERIOD);
        assert!(source.subscription(0).requests().is_empty());
    }
}
