//! # The four-signal backpressure protocol.
//!
//! ```text
//!   Publisher ──subscribe(subscriber)──► creates Subscription
//!       │
//!       ├── on_subscribe(subscription) ─► Subscriber   (exactly once, first)
//!       ├── on_next(item)              ─► Subscriber   (≤ requested demand)
//!       └── on_error(e) | on_complete  ─► Subscriber   (at most one, last)
//!
//!   Subscriber ──request(n) / cancel()──► Subscription
//! ```
//!
//! All methods take `&self`; implementations keep their state behind atomics so
//! that producers, consumers and timers can call in from independent threads.

use std::sync::Arc;

use crate::error::FlowError;

/// Demand-control handle a consumer holds on a producer.
///
/// - `request(n)` only ever increases demand (saturating at [`UNBOUNDED`](crate::UNBOUNDED));
///   `n == 0` is a protocol violation reported through `on_error`.
/// - `cancel()` is idempotent; once observed no further signals are delivered.
pub trait Subscription: Send + Sync {
    /// Authorizes the producer to emit up to `n` more items.
    fn request(&self, n: u64);

    /// Stops the flow of signals and releases upstream resources.
    fn cancel(&self);
}

/// Receiver of the protocol signals.
pub trait Subscriber<T>: Send + Sync {
    /// Called once, before any other signal.
    fn on_subscribe(&self, subscription: SubscriptionRef);

    /// Delivers one item. Never called concurrently for the same subscriber.
    fn on_next(&self, item: T);

    /// Terminal failure.
    fn on_error(&self, error: FlowError);

    /// Terminal success.
    fn on_complete(&self);
}

/// Source of items.
pub trait Publisher<T>: Send + Sync {
    /// Attaches a subscriber. Every call starts an independent subscription.
    fn subscribe(&self, subscriber: SubscriberRef<T>);

    /// Returns the value of a source known to emit exactly one item.
    ///
    /// Operators use this to skip the subscription machinery entirely (zip
    /// turns such sources into pre-filled slots).
    fn as_scalar(&self) -> Option<T> {
        None
    }
}

/// Shared handle to a [`Subscription`].
pub type SubscriptionRef = Arc<dyn Subscription>;

/// Shared handle to a [`Subscriber`].
pub type SubscriberRef<T> = Arc<dyn Subscriber<T>>;

/// Shared handle to a [`Publisher`].
pub type PublisherRef<T> = Arc<dyn Publisher<T>>;

/// Subscription that ignores every signal.
///
/// Handed to subscribers of sources that terminate without producing data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

impl NoopSubscription {
    /// Returns the no-op subscription as a shared handle.
    pub fn arc() -> SubscriptionRef {
        Arc::new(NoopSubscription)
    }
}
