//! # Immediate resubscription on error.
//!
//! [`RetryOperator`] re-subscribes to its source whenever the source fails
//! and the [`RetryPolicy`] allows it. The downstream keeps a single
//! subscription across attempts and never observes the intermediate errors.
//!
//! ## State machine
//! ```text
//! ACTIVE ── on_next ─────────────► ACTIVE      (forward, demand -= 1)
//! ACTIVE ── on_error(e), retry ──► ACTIVE      (new connection, unsatisfied demand re-requested)
//! ACTIVE ── on_error(e), give up ► TERMINATED  (e propagated)
//! ACTIVE ── on_complete ─────────► TERMINATED  (no retry on clean completion)
//! any    ── cancel ──────────────► TERMINATED
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::FlowError;
use crate::events::{Bus, Event, EventKind};
use crate::flow::{Publisher, PublisherRef, SubscriberRef};
use crate::policies::RetryPolicy;
use crate::subscriber::{DemandSubscriber, Strategy};

/// Publisher that retries its source according to a [`RetryPolicy`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use pullstream::{fail, Publisher, RetryOperator, RetryPolicy, FlowError, Sink};
///
/// let retried = RetryOperator::new(fail::<u32>(FlowError::upstream("down")), RetryPolicy::times(2));
/// retried.subscribe(Arc::new(Sink::new(|_: u32| {}).on_error(|e| assert_eq!(e.as_label(), "flow_upstream"))));
/// ```
pub struct RetryOperator<T> {
    source: PublisherRef<T>,
    policy: RetryPolicy,
    bus: Option<Bus>,
}

impl<T: Send + 'static> RetryOperator<T> {
    pub fn new(source: PublisherRef<T>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            bus: None,
        }
    }

    /// Publishes `Resubscribing`/`RetryExhausted` events to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }
}

impl<T: Send + 'static> Publisher<T> for RetryOperator<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let core = DemandSubscriber::new(
            subscriber,
            Retrying {
                source: Arc::clone(&self.source),
                policy: self.policy.clone(),
                retries: AtomicU64::new(0),
                bus: self.bus.clone(),
            },
        );
        core.connect(&self.source);
    }
}

struct Retrying<T> {
    source: PublisherRef<T>,
    policy: RetryPolicy,
    retries: AtomicU64,
    bus: Option<Bus>,
}

impl<T: Send + 'static> Strategy<T, T> for Retrying<T> {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
    }

    fn on_error(&self, core: &DemandSubscriber<T, T, Self>, error: FlowError) {
        let attempt = self.retries.fetch_add(1, Ordering::AcqRel) + 1;
        if self.policy.should_retry(attempt, &error) {
            debug!(attempt, error = %error, "resubscribing after upstream error");
            self.publish(EventKind::Resubscribing, attempt, &error);
            core.connect(&self.source);
        } else {
            debug!(attempt, error = %error, "retry policy exhausted");
            self.publish(EventKind::RetryExhausted, attempt, &error);
            core.emit_error(error);
        }
    }

    fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

impl<T> Retrying<T> {
    fn publish(&self, kind: EventKind, attempt: u64, error: &FlowError) {
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(kind)
                    .with_operator("retry")
                    .with_attempt(attempt)
                    .with_reason(error.to_string()),
            );
        }
    }
}
