//! Protocol traits, demand arithmetic and the multicast processor.
//!
//! ## Contents
//! - [`Publisher`], [`Subscriber`], [`Subscription`] the three protocol roles
//! - [`UNBOUNDED`], [`add_cap`], [`get_and_add_cap`] saturating demand arithmetic
//! - [`Broadcaster`] hot multicast processor used as a companion channel

mod broadcast;
mod demand;
mod protocol;

pub use broadcast::Broadcaster;
pub use demand::{add_cap, consume, get_and_add_cap, sub_saturating, UNBOUNDED};
pub use protocol::{
    NoopSubscription, Publisher, PublisherRef, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef,
};

use crate::error::FlowError;

/// Recorded terminal signal, delivered at most once.
#[derive(Debug, Clone)]
pub(crate) enum Terminal {
    Complete,
    Error(FlowError),
}

impl Terminal {
    pub(crate) fn deliver<T>(&self, subscriber: &dyn Subscriber<T>) {
        match self {
            Terminal::Complete => subscriber.on_complete(),
            Terminal::Error(e) => subscriber.on_error(e.clone()),
        }
    }
}
