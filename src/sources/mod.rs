//! Minimal sources for wiring pipelines.
//!
//! - [`just`] one value; exposes it through `as_scalar`
//! - [`from_iter`] a replayed sequence
//! - [`empty`] completes immediately
//! - [`fail`] errors immediately

mod iter;

use std::marker::PhantomData;
use std::sync::Arc;

pub use iter::FromIter;

use crate::error::FlowError;
use crate::flow::{NoopSubscription, Publisher, PublisherRef, SubscriberRef};

/// Publisher of a single value.
pub fn just<T: Clone + Send + Sync + 'static>(value: T) -> PublisherRef<T> {
    Arc::new(FromIter::new([value]))
}

/// Publisher replaying `items` to every subscriber.
pub fn from_iter<T, I>(items: I) -> PublisherRef<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    Arc::new(FromIter::new(items))
}

/// Publisher that completes without emitting.
pub fn empty<T: Send + 'static>() -> PublisherRef<T> {
    Arc::new(Empty(PhantomData))
}

/// Publisher that fails with `error` on every subscription.
pub fn fail<T: Send + 'static>(error: FlowError) -> PublisherRef<T> {
    Arc::new(Fail {
        error,
        _marker: PhantomData,
    })
}

struct Empty<T>(PhantomData<fn() -> T>);

impl<T> Publisher<T> for Empty<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        subscriber.on_subscribe(NoopSubscription::arc());
        subscriber.on_complete();
    }
}

struct Fail<T> {
    error: FlowError,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Publisher<T> for Fail<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        subscriber.on_subscribe(NoopSubscription::arc());
        subscriber.on_error(self.error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Recorder;

    #[test]
    fn test_just_emits_one_value() {
        let source = just(42u32);
        assert_eq!(source.as_scalar(), Some(42));
        let rec = Recorder::new(1);
        source.subscribe(rec.clone());
        assert_eq!(rec.items(), vec![42]);
        assert!(rec.is_completed());
    }

    #[test]
    fn test_empty_and_fail_terminate_immediately() {
        let rec = Recorder::<u8>::new(0);
        empty::<u8>().subscribe(rec.clone());
        assert!(rec.is_completed());

        let rec = Recorder::<u8>::new(0);
        fail::<u8>(FlowError::upstream("down")).subscribe(rec.clone());
        assert_eq!(rec.errors(), vec![FlowError::upstream("down")]);
    }
}
