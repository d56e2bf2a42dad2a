//! Serializing gate in front of a downstream subscriber.
//!
//! Items and the terminal signal are queued, then delivered by whichever
//! thread moves `wip` from zero. Callers that arrive while a delivery is in
//! flight (another thread, or the downstream re-entering through `request`)
//! leave their item in the queue and return; the active thread picks it up.
//!
//! ```text
//! next(item) ──► queue.push ──┐
//!                             ├──► drain (wip 0 → 1) ──► on_next* ──► terminal
//! terminate(t) ─► slot.set ───┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

use crossbeam_queue::SegQueue;

use crate::flow::{SubscriberRef, SubscriptionRef, Terminal};

pub(crate) struct Emitter<O> {
    downstream: SubscriberRef<O>,
    queue: SegQueue<O>,
    wip: AtomicUsize,
    terminal: OnceLock<Terminal>,
    delivered: AtomicBool,
    cancelled: AtomicBool,
}

impl<O> Emitter<O> {
    pub(crate) fn new(downstream: SubscriberRef<O>) -> Self {
        Self {
            downstream,
            queue: SegQueue::new(),
            wip: AtomicUsize::new(0),
            terminal: OnceLock::new(),
            delivered: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn subscribe(&self, subscription: SubscriptionRef) {
        self.downstream.on_subscribe(subscription);
    }

    /// Queues one item for delivery. Returns `false` if the gate is closed.
    pub(crate) fn next(&self, item: O) -> bool {
        if self.terminal.get().is_some() || self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.queue.push(item);
        self.drain();
        true
    }

    /// Records a terminal signal, delivered after the queued items.
    /// Returns `false` if one was already recorded.
    pub(crate) fn terminate(&self, terminal: Terminal) -> bool {
        if self.terminal.set(terminal).is_err() {
            return false;
        }
        self.drain();
        true
    }

    /// Drops queued items; nothing is delivered afterwards.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.drain();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminal.get().is_some()
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            self.drain_once();
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn drain_once(&self) {
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.delivered.load(Ordering::Acquire) {
                while self.queue.pop().is_some() {}
                return;
            }
            match self.queue.pop() {
                Some(item) => self.downstream.on_next(item),
                None => break,
            }
        }
        if let Some(terminal) = self.terminal.get() {
            if !self.delivered.swap(true, Ordering::AcqRel) {
                terminal.deliver(self.downstream.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::flow::Subscriber;
    use crate::test_support::Recorder;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_terminal_closes_gate() {
        let rec = Recorder::<u8>::new(0);
        let emitter = Emitter::new(rec.clone() as SubscriberRef<u8>);
        assert!(emitter.next(1));
        assert!(emitter.terminate(Terminal::Complete));
        assert!(!emitter.next(2));
        assert!(!emitter.terminate(Terminal::Error(FlowError::MissingDemand)));

        assert_eq!(rec.items(), vec![1u8]);
        assert_eq!(rec.completions(), 1);
        assert!(rec.errors().is_empty());
    }

    /// Calls back into the gate from inside `on_next`.
    struct Reentrant {
        gate: Mutex<Option<Arc<Emitter<u8>>>>,
        log: Mutex<Vec<String>>,
        action: fn(&Emitter<u8>, u8),
    }

    impl Subscriber<u8> for Reentrant {
        fn on_subscribe(&self, _: SubscriptionRef) {}
        fn on_next(&self, item: u8) {
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                (self.action)(&gate, item);
            }
            self.log.lock().push(format!("next {item}"));
        }
        fn on_error(&self, _: FlowError) {}
        fn on_complete(&self) {
            self.log.lock().push("complete".to_string());
        }
    }

    fn reentrant(action: fn(&Emitter<u8>, u8)) -> (Arc<Reentrant>, Arc<Emitter<u8>>) {
        let sink = Arc::new(Reentrant {
            gate: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            action,
        });
        let emitter = Arc::new(Emitter::new(sink.clone() as SubscriberRef<u8>));
        *sink.gate.lock() = Some(Arc::clone(&emitter));
        (sink, emitter)
    }

    #[test]
    fn test_terminal_during_emission_is_delivered_after_item() {
        let (sink, emitter) = reentrant(|gate, _| {
            gate.terminate(Terminal::Complete);
        });

        emitter.next(1);
        assert_eq!(*sink.log.lock(), vec!["next 1", "complete"]);
    }

    #[test]
    fn test_items_raised_during_emission_are_queued_in_order() {
        let (sink, emitter) = reentrant(|gate, item| {
            if item < 3 {
                assert!(gate.next(item + 1));
            }
        });

        assert!(emitter.next(0));
        assert_eq!(
            *sink.log.lock(),
            vec!["next 0", "next 1", "next 2", "next 3"]
        );
    }

    #[test]
    fn test_cancel_drops_queued_items() {
        let (sink, emitter) = reentrant(|gate, item| {
            if item == 0 {
                gate.next(1);
                gate.cancel();
            }
        });

        emitter.next(0);
        assert!(!emitter.next(5));
        assert_eq!(*sink.log.lock(), vec!["next 0"]);
    }
}
