//! # Hot multicast processor.
//!
//! [`Broadcaster`] is both the writer side of a channel (`emit`, `error`,
//! `complete`) and a [`Publisher`]. It backs the companion streams of the
//! retry-when and request-when operators: the operator pushes errors or
//! request amounts in, a user function shapes the stream that comes out.
//!
//! ## Rules
//! - **Hot**: a subscriber only sees items emitted after it subscribed.
//! - **Per-subscriber demand**: items wait in an unbounded per-subscriber
//!   queue until that subscriber requests them.
//! - **Terminal replay**: subscribers that arrive after `error`/`complete`
//!   receive the terminal signal immediately.
//! - **First terminal wins**: later `error`/`complete` calls are ignored.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::demand::{get_and_add_cap, UNBOUNDED};
use super::protocol::{Publisher, SubscriberRef, Subscription, SubscriptionRef};
use super::Terminal;
use crate::error::FlowError;

/// Multicast processor with per-subscriber backpressure.
pub struct Broadcaster<T> {
    me: Weak<Broadcaster<T>>,
    channels: RwLock<Vec<Arc<Channel<T>>>>,
    terminal: OnceLock<Terminal>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Creates an empty, open broadcaster.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            channels: RwLock::new(Vec::new()),
            terminal: OnceLock::new(),
        })
    }

    /// Queues `item` for every current subscriber. Dropped after a terminal.
    pub fn emit(&self, item: T) {
        if self.terminal.get().is_some() {
            trace!("broadcaster closed, dropping item");
            return;
        }
        for channel in self.snapshot() {
            channel.queue.lock().push_back(item.clone());
            channel.drain();
        }
    }

    /// Terminates every subscriber with `error`.
    pub fn error(&self, error: FlowError) {
        self.terminate(Terminal::Error(error));
    }

    /// Completes every subscriber once its queue has been drained.
    pub fn complete(&self) {
        self.terminate(Terminal::Complete);
    }

    /// Number of attached, non-cancelled subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether `error` or `complete` has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminal.get().is_some()
    }

    fn terminate(&self, terminal: Terminal) {
        if self.terminal.set(terminal).is_err() {
            return;
        }
        for channel in self.snapshot() {
            channel.drain();
        }
    }

    fn snapshot(&self) -> Vec<Arc<Channel<T>>> {
        self.channels.read().clone()
    }

    fn remove(&self, channel: &Arc<Channel<T>>) {
        self.channels.write().retain(|c| !Arc::ptr_eq(c, channel));
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for Broadcaster<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let channel = Arc::new_cyclic(|me| Channel {
            me: me.clone(),
            parent: self.me.clone(),
            downstream: subscriber,
            queue: Mutex::new(VecDeque::new()),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            fault: OnceLock::new(),
        });
        self.channels.write().push(Arc::clone(&channel));
        channel
            .downstream
            .on_subscribe(Arc::clone(&channel) as SubscriptionRef);
        channel.drain();
    }
}

struct Channel<T> {
    me: Weak<Channel<T>>,
    parent: Weak<Broadcaster<T>>,
    downstream: SubscriberRef<T>,
    queue: Mutex<VecDeque<T>>,
    requested: AtomicU64,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    fault: OnceLock<FlowError>,
}

impl<T: Clone + Send + 'static> Channel<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.drain_once() {
                return;
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    /// Returns `true` once the channel has reached a terminal state.
    fn drain_once(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            self.queue.lock().clear();
            return true;
        }
        if let Some(fault) = self.fault.get() {
            self.detach();
            self.downstream.on_error(fault.clone());
            return true;
        }

        let requested = self.requested.load(Ordering::Acquire);
        let mut emitted = 0u64;
        while emitted != requested {
            let item = self.queue.lock().pop_front();
            let Some(item) = item else { break };
            self.downstream.on_next(item);
            emitted += 1;
            if self.cancelled.load(Ordering::Acquire) {
                self.queue.lock().clear();
                return true;
            }
        }
        if emitted > 0 && requested != UNBOUNDED {
            self.requested.fetch_sub(emitted, Ordering::AcqRel);
        }

        let parent_terminal = self
            .parent
            .upgrade()
            .and_then(|p| p.terminal.get().cloned());
        if let Some(terminal) = parent_terminal {
            if self.queue.lock().is_empty() {
                self.detach();
                terminal.deliver(self.downstream.as_ref());
                return true;
            }
        }
        false
    }

    fn detach(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let (Some(parent), Some(me)) = (self.parent.upgrade(), self.me.upgrade()) {
            parent.remove(&me);
        }
    }
}

impl<T: Clone + Send + 'static> Subscription for Channel<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            let _ = self.fault.set(FlowError::NonPositiveRequest);
        } else {
            get_and_add_cap(&self.requested, n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(parent), Some(me)) = (self.parent.upgrade(), self.me.upgrade()) {
            parent.remove(&me);
        }
        self.drain();
    }
}
