//! # Demand shaped by a companion stream.
//!
//! [`RequestWhenOperator`] publishes every downstream `request(n)` into a
//! channel of amounts and lets a user function shape it. Each positive value
//! the shaped stream emits is requested from the source; zeros are skipped.
//!
//! - Companion error → upstream cancelled, error propagated.
//! - Companion completion → no further upstream requests.
//! - Source completion → the amount channel is closed.
//!
//! Items still only flow against downstream demand: a companion that asks
//! the source for more than downstream requested gets the pipeline torn down
//! with [`FlowError::MissingDemand`].

use std::sync::{Arc, Weak};

use tracing::debug;

use crate::error::FlowError;
use crate::flow::{Broadcaster, Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef, UNBOUNDED};
use crate::subscriber::{DemandSubscriber, Strategy};
use crate::subscription::SwapSubscription;

/// Publisher whose upstream demand is decided by `control(requests)`.
pub struct RequestWhenOperator<T, F> {
    source: PublisherRef<T>,
    control: F,
}

impl<T, F> RequestWhenOperator<T, F>
where
    T: Send + 'static,
    F: Fn(PublisherRef<u64>) -> PublisherRef<u64> + Send + Sync + 'static,
{
    pub fn new(source: PublisherRef<T>, control: F) -> Self {
        Self { source, control }
    }
}

impl<T, F> Publisher<T> for RequestWhenOperator<T, F>
where
    T: Send + 'static,
    F: Fn(PublisherRef<u64>) -> PublisherRef<u64> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let requests = Broadcaster::new();
        let core = DemandSubscriber::new(
            subscriber,
            Gated {
                requests: Arc::clone(&requests),
                companion: SwapSubscription::new(),
            },
        );
        let amounts = (self.control)(requests as PublisherRef<u64>);
        amounts.subscribe(Arc::new(AmountSubscriber {
            core: core.downgrade(),
        }));
        core.connect(&self.source);
    }
}

struct Gated {
    requests: Arc<Broadcaster<u64>>,
    companion: SwapSubscription,
}

impl<T: Send + 'static> Strategy<T, T> for Gated {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
    }

    fn on_request(&self, _core: &DemandSubscriber<T, T, Self>, n: u64) {
        self.requests.emit(n);
    }

    fn on_error(&self, core: &DemandSubscriber<T, T, Self>, error: FlowError) {
        self.requests.complete();
        core.emit_error(error);
    }

    fn on_complete(&self, core: &DemandSubscriber<T, T, Self>) {
        self.requests.complete();
        core.emit_complete();
    }

    fn on_dispose(&self, _core: &DemandSubscriber<T, T, Self>) {
        self.companion.cancel();
        self.requests.complete();
    }

    fn name(&self) -> &'static str {
        "request_when"
    }
}

struct AmountSubscriber<T> {
    core: Weak<DemandSubscriber<T, T, Gated>>,
}

impl<T: Send + 'static> Subscriber<u64> for AmountSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        let Some(core) = self.core.upgrade() else {
            subscription.cancel();
            return;
        };
        let companion = &core.strategy().companion;
        if companion.swap_to(subscription) {
            companion.request(UNBOUNDED);
        }
    }

    fn on_next(&self, amount: u64) {
        if amount == 0 {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            core.request_upstream(amount);
        }
    }

    fn on_error(&self, error: FlowError) {
        if let Some(core) = self.core.upgrade() {
            core.fail(error);
        }
    }

    fn on_complete(&self) {
        debug!("request companion completed, upstream demand frozen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualPublisher, Recorder};

    #[test]
    fn test_identity_forwards_requests() {
        let source = ManualPublisher::<u32>::new();
        let op = RequestWhenOperator::new(source.clone() as PublisherRef<u32>, |requests| requests);
        let rec = Recorder::new(3);
        op.subscribe(rec.clone());

        rec.request(2);
        assert_eq!(source.subscription(0).requests(), vec![3, 2]);
        for i in 0..5 {
            assert!(source.try_next(i));
        }
        assert_eq!(rec.count(), 5);
    }

    #[test]
    fn test_companion_decides_amounts() {
        let source = ManualPublisher::<u32>::new();
        let control = ManualPublisher::<u64>::new();
        let c = Arc::clone(&control);
        let op = RequestWhenOperator::new(source.clone() as PublisherRef<u32>, move |_requests| {
            Arc::clone(&c) as PublisherRef<u64>
        });
        let rec = Recorder::new(10);
        op.subscribe(rec.clone());

        assert!(source.subscription(0).requests().is_empty());
        control.next(0);
        control.next(4);
        assert_eq!(source.subscription(0).requests(), vec![4]);

        control.complete();
        rec.request(5);
        assert_eq!(source.subscription(0).requests(), vec![4]);
    }

    #[test]
    fn test_companion_error_fails_pipeline() {
        let source = ManualPublisher::<u32>::new();
        let control = ManualPublisher::<u64>::new();
        let c = Arc::clone(&control);
        let op = RequestWhenOperator::new(source.clone() as PublisherRef<u32>, move |_requests| {
            Arc::clone(&c) as PublisherRef<u64>
        });
        let rec = Recorder::new(1);
        op.subscribe(rec.clone());

        control.error(FlowError::upstream("gate broke"));
        assert_eq!(rec.errors(), vec![FlowError::upstream("gate broke")]);
        assert!(source.subscription(0).is_cancelled());
    }

    #[test]
    fn test_overrequesting_companion_is_a_violation() {
        let source = ManualPublisher::<u32>::new();
        let control = ManualPublisher::<u64>::new();
        let c = Arc::clone(&control);
        let op = RequestWhenOperator::new(source.clone() as PublisherRef<u32>, move |_requests| {
            Arc::clone(&c) as PublisherRef<u64>
        });
        let rec = Recorder::new(1);
        op.subscribe(rec.clone());

        control.next(2);
        assert!(source.try_next(1));
        assert!(source.try_next(2));
        assert_eq!(rec.items(), vec![1]);
        assert_eq!(rec.errors(), vec![FlowError::MissingDemand]);
    }

    #[test]
    fn test_source_completion_closes_request_channel() {
        let source = ManualPublisher::<u32>::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let op = RequestWhenOperator::new(source.clone() as PublisherRef<u32>, move |requests| {
            *slot.lock() = Some(Arc::clone(&requests));
            requests
        });
        let rec = Recorder::new(1);
        op.subscribe(rec.clone());

        let companion_rec = Recorder::<u64>::new(UNBOUNDED);
        source.complete();
        let requests = seen.lock().clone().unwrap();
        requests.subscribe(companion_rec.clone());
        assert_eq!(rec.completions(), 1);
        assert_eq!(companion_rec.completions(), 1);
    }
}
