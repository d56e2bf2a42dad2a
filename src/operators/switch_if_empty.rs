//! Fallback for sources that complete without emitting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::flow::{Publisher, PublisherRef, SubscriberRef};
use crate::subscriber::{DemandSubscriber, Strategy};

/// Publisher that switches to `fallback` when `source` turns out empty.
///
/// The fallback inherits the demand the empty source left unsatisfied. A
/// scalar fallback is emitted in place when demand is already there.
pub struct SwitchIfEmpty<T> {
    source: PublisherRef<T>,
    fallback: PublisherRef<T>,
}

impl<T: Send + 'static> SwitchIfEmpty<T> {
    pub fn new(source: PublisherRef<T>, fallback: PublisherRef<T>) -> Self {
        Self { source, fallback }
    }
}

impl<T: Send + 'static> Publisher<T> for SwitchIfEmpty<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let core = DemandSubscriber::new(
            subscriber,
            Switching {
                fallback: Arc::clone(&self.fallback),
                has_value: AtomicBool::new(false),
                switched: AtomicBool::new(false),
            },
        );
        core.connect(&self.source);
    }
}

struct Switching<T> {
    fallback: PublisherRef<T>,
    has_value: AtomicBool,
    switched: AtomicBool,
}

impl<T: Send + 'static> Strategy<T, T> for Switching<T> {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        self.has_value.store(true, Ordering::Release);
        core.emit_next(item);
    }

    fn on_complete(&self, core: &DemandSubscriber<T, T, Self>) {
        if self.has_value.load(Ordering::Acquire) || self.switched.swap(true, Ordering::AcqRel) {
            core.emit_complete();
            return;
        }
        debug!("source completed empty, switching to fallback");
        if let Some(value) = self.fallback.as_scalar() {
            if core.claim_demand() {
                core.emit_next(value);
                core.finish();
                return;
            }
        }
        core.connect(&self.fallback);
    }

    fn name(&self) -> &'static str {
        "switch_if_empty"
    }
}
