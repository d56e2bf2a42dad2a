//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::FlowError;
use crate::flow::{consume, get_and_add_cap, Publisher, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

/// Subscriber that records every signal and flags overlapping `on_next` calls.
pub(crate) struct Recorder<T> {
    initial: u64,
    refill: u64,
    subscription: Mutex<Option<SubscriptionRef>>,
    items: Mutex<Vec<T>>,
    errors: Mutex<Vec<FlowError>>,
    completions: AtomicUsize,
    subscribes: AtomicUsize,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
}

impl<T> Recorder<T> {
    /// Recorder that requests `initial` items from `on_subscribe` (0 = none).
    pub(crate) fn new(initial: u64) -> Arc<Self> {
        Self::with_refill(initial, 0)
    }

    /// Recorder that also requests `refill` more from inside every `on_next`.
    pub(crate) fn with_refill(initial: u64, refill: u64) -> Arc<Self> {
        Arc::new(Self {
            initial,
            refill,
            subscription: Mutex::new(None),
            items: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
        })
    }

    pub(crate) fn request(&self, n: u64) {
        let sub = self.subscription.lock().clone();
        if let Some(sub) = sub {
            sub.request(n);
        }
    }

    pub(crate) fn cancel(&self) {
        let sub = self.subscription.lock().clone();
        if let Some(sub) = sub {
            sub.cancel();
        }
    }

    pub(crate) fn errors(&self) -> Vec<FlowError> {
        self.errors.lock().clone()
    }

    pub(crate) fn completions(&self) -> usize {
        self.completions.load(Ordering::Acquire)
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completions() > 0
    }

    pub(crate) fn terminals(&self) -> usize {
        self.completions() + self.errors.lock().len()
    }

    pub(crate) fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::Acquire)
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::Acquire)
    }

    pub(crate) fn count(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T: Clone> Recorder<T> {
    pub(crate) fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

impl<T: Send> Subscriber<T> for Recorder<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.subscribes.fetch_add(1, Ordering::AcqRel);
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&self, item: T) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.overlapped.store(true, Ordering::Release);
        }
        self.items.lock().push(item);
        for _ in 0..64 {
            std::hint::spin_loop();
        }
        self.in_flight.store(false, Ordering::Release);
        if self.refill > 0 {
            self.request(self.refill);
        }
    }

    fn on_error(&self, error: FlowError) {
        self.errors.lock().push(error);
    }

    fn on_complete(&self) {
        self.completions.fetch_add(1, Ordering::AcqRel);
    }
}

/// Subscription handed out by [`ManualPublisher`]; records every request.
pub(crate) struct ManualSubscription {
    requested: AtomicU64,
    requests: Mutex<Vec<u64>>,
    cancels: AtomicUsize,
}

impl ManualSubscription {
    pub(crate) fn requests(&self) -> Vec<u64> {
        self.requests.lock().clone()
    }

    pub(crate) fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancels.load(Ordering::Acquire) > 0
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::Acquire)
    }
}

impl Subscription for ManualSubscription {
    fn request(&self, n: u64) {
        self.requests.lock().push(n);
        get_and_add_cap(&self.requested, n);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::AcqRel);
    }
}

struct Attached<T> {
    subscriber: SubscriberRef<T>,
    subscription: Arc<ManualSubscription>,
}

/// Publisher driven by the test: signals are pushed to the latest subscriber.
pub(crate) struct ManualPublisher<T> {
    attached: Mutex<Vec<Attached<T>>>,
}

impl<T> ManualPublisher<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            attached: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.attached.lock().len()
    }

    fn latest(&self) -> Option<(SubscriberRef<T>, Arc<ManualSubscription>)> {
        self.attached
            .lock()
            .last()
            .map(|a| (Arc::clone(&a.subscriber), Arc::clone(&a.subscription)))
    }

    /// Subscription handed to the `index`-th subscriber.
    pub(crate) fn subscription(&self, index: usize) -> Arc<ManualSubscription> {
        Arc::clone(&self.attached.lock()[index].subscription)
    }

    /// Delivers `item` regardless of demand.
    pub(crate) fn next(&self, item: T) {
        if let Some((sub, _)) = self.latest() {
            sub.on_next(item);
        }
    }

    /// Delivers `item` only if the latest subscriber has demand.
    pub(crate) fn try_next(&self, item: T) -> bool {
        match self.latest() {
            Some((sub, subscription)) if !subscription.is_cancelled() => {
                if consume(&subscription.requested, 1).is_err() {
                    return false;
                }
                sub.on_next(item);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn error(&self, error: FlowError) {
        if let Some((sub, _)) = self.latest() {
            sub.on_error(error);
        }
    }

    pub(crate) fn complete(&self) {
        if let Some((sub, _)) = self.latest() {
            sub.on_complete();
        }
    }
}

impl<T: Send> Publisher<T> for ManualPublisher<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let subscription = Arc::new(ManualSubscription {
            requested: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        });
        self.attached.lock().push(Attached {
            subscriber: Arc::clone(&subscriber),
            subscription: Arc::clone(&subscription),
        });
        subscriber.on_subscribe(subscription);
    }
}

/// Publisher whose every subscription fails immediately; counts attempts.
pub(crate) struct Failing {
    attempts: AtomicUsize,
}

impl Failing {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

impl<T> Publisher<T> for Failing {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let n = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        subscriber.on_subscribe(crate::flow::NoopSubscription::arc());
        subscriber.on_error(FlowError::upstream(format!("attempt {n}")));
    }
}

/// Source of `0..total` that emits directly from inside `request`, without
/// any trampoline, and completes after the last item.
pub(crate) struct Eager {
    total: u32,
}

impl Eager {
    pub(crate) fn new(total: u32) -> Arc<Self> {
        Arc::new(Self { total })
    }
}

impl Publisher<u32> for Eager {
    fn subscribe(&self, subscriber: SubscriberRef<u32>) {
        let subscription = Arc::new(EagerSubscription {
            downstream: Arc::clone(&subscriber),
            next: AtomicU32::new(0),
            total: self.total,
            cancelled: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct EagerSubscription {
    downstream: SubscriberRef<u32>,
    next: AtomicU32,
    total: u32,
    cancelled: AtomicBool,
}

impl Subscription for EagerSubscription {
    fn request(&self, n: u64) {
        for _ in 0..n {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            let item = self.next.fetch_add(1, Ordering::AcqRel);
            if item >= self.total {
                return;
            }
            self.downstream.on_next(item);
            if item + 1 == self.total {
                self.downstream.on_complete();
                return;
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
