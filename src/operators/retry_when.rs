//! # Resubscription gated by a companion stream.
//!
//! [`RetryWhenOperator`] pushes every upstream error into a per-subscription
//! error channel and lets a user function turn that channel into a stream of
//! go signals. Each signal resubscribes the source; the signal stream ending
//! (or failing) ends the whole pipeline.
//!
//! ## Wiring
//! ```text
//!            errors ──► control(errors) ──► RestartSubscriber
//!              ▲                                  │ on_next → connect(source)
//!              │ on_error                          │ on_error → fail
//! source ──► DemandSubscriber ──► downstream       │ on_complete → finish
//!              ▲                                  │
//!              └──────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - The companion is subscribed before the source, so an error raised
//!   synchronously by the first attempt is already observed.
//! - The companion is asked for one signal at a time.
//! - Clean upstream completion completes downstream immediately and closes
//!   the error channel without waiting on the companion.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::error::FlowError;
use crate::events::{Bus, Event, EventKind};
use crate::flow::{Broadcaster, Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef};
use crate::subscriber::{DemandSubscriber, Strategy};
use crate::subscription::SwapSubscription;

/// Publisher that resubscribes its source on each signal of a companion stream.
///
/// `control` receives the stream of upstream errors and returns the signal
/// stream; see [`retry_backoff`](crate::retry_backoff) for a timed one.
pub struct RetryWhenOperator<T, B, F> {
    source: PublisherRef<T>,
    control: F,
    bus: Option<Bus>,
    _signal: PhantomData<fn() -> B>,
}

impl<T, B, F> RetryWhenOperator<T, B, F>
where
    T: Send + 'static,
    B: Send + 'static,
    F: Fn(PublisherRef<FlowError>) -> PublisherRef<B> + Send + Sync + 'static,
{
    pub fn new(source: PublisherRef<T>, control: F) -> Self {
        Self {
            source,
            control,
            bus: None,
            _signal: PhantomData,
        }
    }

    /// Publishes a `Resubscribing` event per companion signal.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }
}

impl<T, B, F> Publisher<T> for RetryWhenOperator<T, B, F>
where
    T: Send + 'static,
    B: Send + 'static,
    F: Fn(PublisherRef<FlowError>) -> PublisherRef<B> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let errors = Broadcaster::new();
        let core = DemandSubscriber::new(
            subscriber,
            Repeating {
                source: Arc::clone(&self.source),
                errors: Arc::clone(&errors),
                companion: SwapSubscription::new(),
                attempts: AtomicU64::new(0),
                bus: self.bus.clone(),
            },
        );
        let signals = (self.control)(errors as PublisherRef<FlowError>);
        signals.subscribe(Arc::new(RestartSubscriber {
            core: core.downgrade(),
            _signal: PhantomData,
        }));
        core.connect(&self.source);
    }
}

struct Repeating<T> {
    source: PublisherRef<T>,
    errors: Arc<Broadcaster<FlowError>>,
    companion: SwapSubscription,
    attempts: AtomicU64,
    bus: Option<Bus>,
}

impl<T: Send + 'static> Strategy<T, T> for Repeating<T> {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
    }

    fn on_error(&self, _core: &DemandSubscriber<T, T, Self>, error: FlowError) {
        debug!(error = %error, "handing upstream error to companion");
        self.errors.emit(error);
    }

    fn on_complete(&self, core: &DemandSubscriber<T, T, Self>) {
        self.errors.complete();
        core.emit_complete();
    }

    fn on_dispose(&self, _core: &DemandSubscriber<T, T, Self>) {
        self.companion.cancel();
        self.errors.complete();
    }

    fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    fn name(&self) -> &'static str {
        "retry_when"
    }
}

/// Companion subscriber turning signals into resubscriptions.
struct RestartSubscriber<T, B> {
    core: Weak<DemandSubscriber<T, T, Repeating<T>>>,
    _signal: PhantomData<fn(B)>,
}

impl<T: Send + 'static, B: Send + 'static> Subscriber<B> for RestartSubscriber<T, B> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        let Some(core) = self.core.upgrade() else {
            subscription.cancel();
            return;
        };
        let companion = &core.strategy().companion;
        if companion.swap_to(subscription) {
            companion.request(1);
        }
    }

    fn on_next(&self, _signal: B) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let strategy = core.strategy();
        strategy.companion.produced(1);
        let attempt = strategy.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(attempt, "companion signalled resubscription");
        if let Some(bus) = &strategy.bus {
            bus.publish(
                Event::new(EventKind::Resubscribing)
                    .with_operator("retry_when")
                    .with_attempt(attempt),
            );
        }
        core.connect(&strategy.source);
        strategy.companion.request(1);
    }

    fn on_error(&self, error: FlowError) {
        if let Some(core) = self.core.upgrade() {
            debug!(error = %error, "companion failed");
            core.fail(error);
        }
    }

    fn on_complete(&self) {
        if let Some(core) = self.core.upgrade() {
            debug!("companion completed, giving up");
            core.finish();
        }
    }
}
