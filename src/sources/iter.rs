//! Cold source replaying a fixed sequence.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::FlowError;
use crate::flow::{
    get_and_add_cap, Publisher, SubscriberRef, Subscription, SubscriptionRef, UNBOUNDED,
};

/// Publisher emitting a cloned copy of `items` to each subscriber.
pub struct FromIter<T> {
    items: Arc<[T]>,
}

impl<T> FromIter<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for FromIter<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let subscription = Arc::new(IterSubscription {
            items: Arc::clone(&self.items),
            downstream: Arc::clone(&subscriber),
            index: AtomicUsize::new(0),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            zero_request: AtomicBool::new(false),
        });
        subscriber.on_subscribe(Arc::clone(&subscription) as SubscriptionRef);
        // Empty sequences complete without waiting for demand.
        if self.items.is_empty() {
            subscription.drain();
        }
    }

    fn as_scalar(&self) -> Option<T> {
        match &*self.items {
            [only] => Some(only.clone()),
            _ => None,
        }
    }
}

struct IterSubscription<T> {
    items: Arc<[T]>,
    downstream: SubscriberRef<T>,
    index: AtomicUsize,
    requested: AtomicU64,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    zero_request: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> IterSubscription<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            if self.zero_request.load(Ordering::Acquire) {
                self.cancelled.store(true, Ordering::Release);
                self.downstream.on_error(FlowError::NonPositiveRequest);
                return;
            }
            let requested = self.requested.load(Ordering::Acquire);
            let mut index = self.index.load(Ordering::Acquire);
            let mut emitted = 0u64;
            while emitted != requested && index < self.items.len() {
                self.downstream.on_next(self.items[index].clone());
                index += 1;
                emitted += 1;
                if self.cancelled.load(Ordering::Acquire) {
                    return;
                }
            }
            self.index.store(index, Ordering::Release);
            if index == self.items.len() {
                self.cancelled.store(true, Ordering::Release);
                self.downstream.on_complete();
                return;
            }
            if emitted > 0 && requested != UNBOUNDED {
                self.requested.fetch_sub(emitted, Ordering::AcqRel);
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscription for IterSubscription<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.zero_request.store(true, Ordering::Release);
        } else {
            get_and_add_cap(&self.requested, n);
        }
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Recorder;

    #[test]
    fn test_emits_on_demand_then_completes() {
        let source = FromIter::new(vec![1, 2, 3]);
        let rec = Recorder::new(2);
        source.subscribe(rec.clone());
        assert_eq!(rec.items(), vec![1, 2]);
        assert!(!rec.is_completed());

        rec.request(1);
        assert_eq!(rec.items(), vec![1, 2, 3]);
        assert!(rec.is_completed());
    }

    #[test]
    fn test_each_subscription_replays() {
        let source = FromIter::new(vec!["a", "b"]);
        for _ in 0..2 {
            let rec = Recorder::new(UNBOUNDED);
            source.subscribe(rec.clone());
            assert_eq!(rec.items(), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_empty_completes_without_demand() {
        let source = FromIter::<u8>::new(Vec::new());
        let rec = Recorder::new(0);
        source.subscribe(rec.clone());
        assert!(rec.is_completed());
    }

    #[test]
    fn test_single_item_is_scalar() {
        assert_eq!(FromIter::new([5]).as_scalar(), Some(5));
        assert_eq!(FromIter::new([5, 6]).as_scalar(), None);
    }
}
