//! # Bounded-prefetch consumption.
//!
//! [`Prefetch`] is the sliding-window bookkeeping shared by bounded consumers
//! and the zip barrier's buffered sources:
//!
//! ```text
//! start:        request(C)                     outstanding = C
//! each item:    outstanding -= 1
//!               outstanding >  L  → nothing
//!               outstanding <= L  → request(C - outstanding), outstanding = C
//! ```
//!
//! At most `C` items are ever in flight and the producer sees one `request`
//! per `C - L` consumed items instead of one per item.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::demand::{DemandSubscriber, Strategy};
use crate::config::Config;
use crate::error::FlowError;
use crate::flow::{PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};

/// Sliding prefetch window of capacity `C` and refill limit `L`.
pub struct Prefetch {
    capacity: u64,
    limit: u64,
    outstanding: AtomicU64,
}

impl Prefetch {
    /// Window of `capacity` (min 1) refilling at a quarter of it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self::with_limit(capacity, capacity / 4)
    }

    /// Window with an explicit limit, clamped below the capacity.
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        let capacity = capacity.max(1) as u64;
        Self {
            capacity,
            limit: (limit as u64).min(capacity - 1),
            outstanding: AtomicU64::new(0),
        }
    }

    /// Opens the window. Returns the amount to request up front.
    pub fn initial(&self) -> u64 {
        self.outstanding.store(self.capacity, Ordering::Release);
        self.capacity
    }

    /// Records one consumed item. Returns the refill to request, if any.
    ///
    /// Called by a single consumer at a time.
    pub fn consumed(&self) -> Option<u64> {
        let remaining = self.outstanding.load(Ordering::Acquire).saturating_sub(1);
        if remaining > self.limit {
            self.outstanding.store(remaining, Ordering::Release);
            None
        } else {
            self.outstanding.store(self.capacity, Ordering::Release);
            Some(self.capacity - remaining)
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Items requested and not yet consumed.
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Prefetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prefetch")
            .field("capacity", &self.capacity)
            .field("limit", &self.limit)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Strategy that drives upstream demand from a [`Prefetch`] window.
///
/// Downstream requests are ignored: the window alone decides what is asked
/// of the producer.
#[derive(Debug)]
pub struct Bounded {
    prefetch: Prefetch,
}

impl<T: Send + 'static> Strategy<T, T> for Bounded {
    fn on_start(&self, core: &DemandSubscriber<T, T, Self>) {
        core.request_more(self.prefetch.initial());
    }

    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
        if let Some(refill) = self.prefetch.consumed() {
            core.request_more(refill);
        }
    }

    fn on_request(&self, _core: &DemandSubscriber<T, T, Self>, _n: u64) {}

    fn name(&self) -> &'static str {
        "bounded"
    }
}

/// Consumer that keeps at most `capacity` items in flight.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use pullstream::{from_iter, BoundedSubscriber, Sink};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let out = Arc::clone(&seen);
/// let sink = Sink::new(move |v: u32| out.lock().unwrap().push(v));
///
/// let consumer = BoundedSubscriber::new(4, Arc::new(sink));
/// consumer.subscribe_to(&from_iter(1..=10));
/// assert_eq!(seen.lock().unwrap().len(), 10);
/// ```
pub struct BoundedSubscriber<T> {
    core: Arc<DemandSubscriber<T, T, Bounded>>,
}

impl<T: Send + 'static> BoundedSubscriber<T> {
    /// Window of `capacity` refilling at `capacity / 4`.
    pub fn new(capacity: usize, sink: SubscriberRef<T>) -> Self {
        Self::from_prefetch(Prefetch::new(capacity), sink)
    }

    /// Window with an explicit refill limit.
    pub fn with_limit(capacity: usize, limit: usize, sink: SubscriberRef<T>) -> Self {
        Self::from_prefetch(Prefetch::with_limit(capacity, limit), sink)
    }

    /// Window sized from [`Config::bounded_capacity`] / [`Config::bounded_limit`].
    pub fn from_config(config: &Config, sink: SubscriberRef<T>) -> Self {
        Self::with_limit(
            config.bounded_capacity_clamped(),
            config.bounded_limit_resolved(),
            sink,
        )
    }

    fn from_prefetch(prefetch: Prefetch, sink: SubscriberRef<T>) -> Self {
        Self {
            core: DemandSubscriber::new(sink, Bounded { prefetch }),
        }
    }

    /// Starts consuming `source`.
    pub fn subscribe_to(&self, source: &PublisherRef<T>) {
        self.core.connect(source);
    }

    pub fn capacity(&self) -> u64 {
        self.core.strategy().prefetch.capacity()
    }

    pub fn limit(&self) -> u64 {
        self.core.strategy().prefetch.limit()
    }

    /// Items requested from upstream and not yet delivered.
    pub fn expected_from_upstream(&self) -> u64 {
        self.core.strategy().prefetch.outstanding()
    }

    /// Stops consumption.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(FlowError) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// Callback subscriber for the end of a pipeline.
///
/// Never requests on its own; pair it with a [`BoundedSubscriber`] or
/// request through the subscription it is handed.
pub struct Sink<T> {
    on_next: NextFn<T>,
    on_error: ErrorFn,
    on_complete: CompleteFn,
}

impl<T> Sink<T> {
    pub fn new(on_next: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_error: Box::new(|_| {}),
            on_complete: Box::new(|| {}),
        }
    }

    pub fn on_error(mut self, f: impl Fn(FlowError) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Box::new(f);
        self
    }
}

impl<T> Subscriber<T> for Sink<T> {
    fn on_subscribe(&self, _subscription: SubscriptionRef) {}

    fn on_next(&self, item: T) {
        (self.on_next)(item);
    }

    fn on_error(&self, error: FlowError) {
        (self.on_error)(error);
    }

    fn on_complete(&self) {
        (self.on_complete)();
    }
}
