//! # Demand-tracking subscriber.
//!
//! [`DemandSubscriber`] is the single coordinator every operator is built on.
//! It sits between an upstream publisher and a downstream subscriber, keeps
//! the demand books, and delegates per-operator behavior to a [`Strategy`].
//!
//! ## Architecture
//! ```text
//!  upstream ──► Connection{gen} ──► DemandSubscriber ──► Emitter ──► downstream
//!      ▲                              │        ▲
//!      └──── SwapSubscription ◄───────┘        └── request(n) / cancel()
//! ```
//!
//! ## Rules
//! - `on_subscribe` reaches the downstream exactly once, before the strategy's
//!   initial requests; later upstream installs (resubscription) stay internal.
//! - Every upstream item consumes one unit of demand; an item without demand
//!   tears the pipeline down with [`FlowError::MissingDemand`].
//! - At most one terminal signal reaches the downstream; later ones are dropped.
//! - `request(0)` is reported as [`FlowError::NonPositiveRequest`].
//! - `cancel()` is idempotent.
//! - Each `connect` opens a new generation; signals from older generations
//!   are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::emitter::Emitter;
use crate::error::FlowError;
use crate::events::{Bus, Event, EventKind};
use crate::flow::{
    consume, get_and_add_cap, PublisherRef, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef, Terminal,
};
use crate::subscription::SwapSubscription;

/// Per-operator hooks driven by a [`DemandSubscriber`].
///
/// Only [`on_next`](Strategy::on_next) is required; the defaults give a
/// transparent pass-through of requests and terminal signals.
pub trait Strategy<I: Send + 'static, O: Send + 'static>: Send + Sync + Sized + 'static {
    /// Runs once, right after the downstream received its subscription.
    fn on_start(&self, _core: &DemandSubscriber<I, O, Self>) {}

    /// Handles an upstream item whose demand has already been accounted.
    fn on_next(&self, core: &DemandSubscriber<I, O, Self>, item: I);

    /// Handles `n` units of downstream demand (already added to the books).
    fn on_request(&self, core: &DemandSubscriber<I, O, Self>, n: u64) {
        core.request_upstream(n);
    }

    /// Handles an upstream error from the current connection.
    fn on_error(&self, core: &DemandSubscriber<I, O, Self>, error: FlowError) {
        core.emit_error(error);
    }

    /// Handles upstream completion of the current connection.
    fn on_complete(&self, core: &DemandSubscriber<I, O, Self>) {
        core.emit_complete();
    }

    /// Runs once when the subscriber is cancelled or terminated.
    fn on_dispose(&self, _core: &DemandSubscriber<I, O, Self>) {}

    /// Event bus for protocol violations; `None` disables publishing.
    fn bus(&self) -> Option<&Bus> {
        None
    }

    /// Human-readable name (for logs/events).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Strategy that forwards items unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl<T: Send + 'static> Strategy<T, T> for Passthrough {
    fn on_next(&self, core: &DemandSubscriber<T, T, Self>, item: T) {
        core.emit_next(item);
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Generic demand-accounting coordinator.
pub struct DemandSubscriber<I, O, S> {
    me: Weak<Self>,
    emitter: Emitter<O>,
    upstream: SwapSubscription,
    /// Demand authorized for upstream delivery (downstream + self-requested).
    requested: AtomicU64,
    cancelled: AtomicBool,
    subscribed: AtomicBool,
    disposed: AtomicBool,
    generation: AtomicU64,
    connect_wip: AtomicUsize,
    next_source: Mutex<Option<PublisherRef<I>>>,
    strategy: S,
}

impl<I, O, S> DemandSubscriber<I, O, S>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Strategy<I, O>,
{
    /// Creates a coordinator for `downstream`. Nothing happens until
    /// [`connect`](Self::connect) attaches an upstream.
    pub fn new(downstream: SubscriberRef<O>, strategy: S) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            emitter: Emitter::new(downstream),
            upstream: SwapSubscription::new(),
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            connect_wip: AtomicUsize::new(0),
            next_source: Mutex::new(None),
            strategy,
        })
    }

    /// The strategy driving this coordinator.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Weak handle for timers and companion subscribers.
    pub fn downgrade(&self) -> Weak<Self> {
        self.me.clone()
    }

    /// Demand currently authorized and not yet consumed.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Consumes one unit of demand for an item produced outside the
    /// upstream path. Returns `false` if there is none.
    pub fn claim_demand(&self) -> bool {
        consume(&self.requested, 1).is_ok()
    }

    /// Demand requested from the current upstream and not yet produced.
    pub fn upstream_outstanding(&self) -> u64 {
        self.upstream.outstanding()
    }

    /// Whether the downstream cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether a terminal signal has been recorded.
    pub fn is_terminated(&self) -> bool {
        self.emitter.is_terminated()
    }

    fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_terminated()
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }

    /// Subscribes a fresh connection to `source`, replacing the current one.
    ///
    /// Unsatisfied upstream demand is re-requested from the new connection.
    /// Calls made while a connect is in progress (a source failing
    /// synchronously inside `subscribe`) are queued and run by the outer
    /// call instead of recursing.
    pub fn connect(&self, source: &PublisherRef<I>) {
        if self.is_done() {
            return;
        }
        *self.next_source.lock() = Some(Arc::clone(source));
        if self.connect_wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            let source = self.next_source.lock().take();
            if let Some(source) = source {
                if self.is_done() || !self.upstream.rearm() {
                    return;
                }
                let Some(core) = self.me.upgrade() else {
                    return;
                };
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                trace!(operator = self.strategy.name(), generation, "connecting upstream");
                source.subscribe(Arc::new(Connection { core, generation }));
            }
            missed = self.connect_wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    /// Requests `n` from the current upstream without touching the books.
    pub fn request_upstream(&self, n: u64) {
        self.upstream.request(n);
    }

    /// Self-authorizes `n` items and requests them upstream.
    pub fn request_more(&self, n: u64) {
        get_and_add_cap(&self.requested, n);
        self.upstream.request(n);
    }

    /// Queues one item for downstream delivery. Returns `false` once the
    /// downstream is cancelled or terminated.
    pub fn emit_next(&self, item: O) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.emitter.next(item)
    }

    /// Terminates the downstream with `error` (first terminal wins).
    pub fn emit_error(&self, error: FlowError) {
        if self.is_cancelled() {
            return;
        }
        self.subscribe_downstream();
        let label = error.as_label();
        if self.emitter.terminate(Terminal::Error(error)) {
            self.dispose();
        } else {
            debug!(operator = self.strategy.name(), error = label, "dropping error after terminal");
        }
    }

    /// Completes the downstream (first terminal wins).
    pub fn emit_complete(&self) {
        if self.is_cancelled() {
            return;
        }
        self.subscribe_downstream();
        if self.emitter.terminate(Terminal::Complete) {
            self.dispose();
        } else {
            debug!(operator = self.strategy.name(), "dropping completion after terminal");
        }
    }

    /// Cancels upstream, then terminates the downstream with `error`.
    pub fn fail(&self, error: FlowError) {
        self.upstream.cancel();
        self.emit_error(error);
    }

    /// Cancels upstream, then completes the downstream.
    pub fn finish(&self) {
        self.upstream.cancel();
        self.emit_complete();
    }

    /// Hands the downstream its subscription, once. A terminal raised before
    /// any upstream install (a companion stream ending early) goes through
    /// here so `on_subscribe` still comes first.
    fn subscribe_downstream(&self) -> bool {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(me) = self.me.upgrade() {
            self.emitter.subscribe(me);
        }
        true
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.strategy.on_dispose(self);
        self.upstream.cancel();
    }

    fn violation(&self, error: FlowError) {
        warn!(operator = self.strategy.name(), error = error.as_label(), "protocol violation");
        if let Some(bus) = self.strategy.bus() {
            bus.publish(
                Event::new(EventKind::ProtocolViolation)
                    .with_operator(self.strategy.name())
                    .with_reason(error.as_message()),
            );
        }
        self.fail(error);
    }

    fn dropped(&self, generation: u64, signal: &'static str) {
        debug!(operator = self.strategy.name(), generation, signal, "dropping late signal");
        if let Some(bus) = self.strategy.bus() {
            bus.publish(
                Event::new(EventKind::SignalDropped)
                    .with_operator(self.strategy.name())
                    .with_reason(signal),
            );
        }
    }

    fn upstream_subscribe(&self, generation: u64, subscription: SubscriptionRef) {
        if self.is_stale(generation) || self.is_done() {
            subscription.cancel();
            return;
        }
        if !self.upstream.swap_to(subscription) {
            if !self.upstream.is_cancelled() {
                self.violation(FlowError::DuplicateSubscription);
            }
            return;
        }
        if self.subscribe_downstream() {
            self.strategy.on_start(self);
        }
    }

    fn upstream_next(&self, generation: u64, item: I) {
        if self.is_stale(generation) || self.is_done() {
            self.dropped(generation, "on_next");
            return;
        }
        self.upstream.produced(1);
        if consume(&self.requested, 1).is_err() {
            self.violation(FlowError::MissingDemand);
            return;
        }
        self.strategy.on_next(self, item);
    }

    fn upstream_error(&self, generation: u64, error: FlowError) {
        if self.is_stale(generation) || self.is_done() {
            self.dropped(generation, "on_error");
            return;
        }
        self.strategy.on_error(self, error);
    }

    fn upstream_complete(&self, generation: u64) {
        if self.is_stale(generation) || self.is_done() {
            self.dropped(generation, "on_complete");
            return;
        }
        self.strategy.on_complete(self);
    }
}

impl<I, O, S> Subscription for DemandSubscriber<I, O, S>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Strategy<I, O>,
{
    fn request(&self, n: u64) {
        if n == 0 {
            self.violation(FlowError::NonPositiveRequest);
            return;
        }
        if self.is_done() {
            return;
        }
        get_and_add_cap(&self.requested, n);
        self.strategy.on_request(self, n);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(operator = self.strategy.name(), "cancelled by downstream");
        self.emitter.cancel();
        self.dispose();
    }
}

/// Upstream-facing subscriber for one generation of a [`DemandSubscriber`].
struct Connection<I, O, S> {
    core: Arc<DemandSubscriber<I, O, S>>,
    generation: u64,
}

impl<I, O, S> Subscriber<I> for Connection<I, O, S>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Strategy<I, O>,
{
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.core.upstream_subscribe(self.generation, subscription);
    }

    fn on_next(&self, item: I) {
        self.core.upstream_next(self.generation, item);
    }

    fn on_error(&self, error: FlowError) {
        self.core.upstream_error(self.generation, error);
    }

    fn on_complete(&self) {
        self.core.upstream_complete(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Publisher, UNBOUNDED};
    use crate::test_support::{Eager, ManualPublisher, Recorder};
    use std::thread;

    fn passthrough(
        initial: u64,
    ) -> (
        Arc<ManualPublisher<u32>>,
        Arc<Recorder<u32>>,
        Arc<DemandSubscriber<u32, u32, Passthrough>>,
    ) {
        let source = ManualPublisher::new();
        let rec = Recorder::new(initial);
        let core = DemandSubscriber::new(rec.clone(), Passthrough);
        core.connect(&(source.clone() as PublisherRef<u32>));
        (source, rec, core)
    }

    #[test]
    fn test_downstream_subscribed_once_and_requests_forwarded() {
        let (source, rec, _core) = passthrough(3);
        assert_eq!(rec.subscribes(), 1);
        assert_eq!(source.subscription(0).requests(), vec![3]);

        rec.request(2);
        assert_eq!(source.subscription(0).requests(), vec![3, 2]);
    }

    #[test]
    fn test_items_never_exceed_requested() {
        let (source, rec, _core) = passthrough(0);
        let mut delivered = 0;
        for (round, n) in [2u64, 1, 4].into_iter().enumerate() {
            rec.request(n);
            while source.try_next(round as u32) {
                delivered += 1;
            }
            assert_eq!(rec.count(), delivered);
        }
        assert_eq!(delivered, 7);
        assert!(rec.errors().is_empty());
    }

    #[test]
    fn test_item_without_demand_is_a_violation() {
        let (source, rec, _core) = passthrough(1);
        source.next(1);
        source.next(2);

        assert_eq!(rec.items(), vec![1]);
        assert_eq!(rec.errors(), vec![FlowError::MissingDemand]);
        assert!(source.subscription(0).is_cancelled());
    }

    #[test]
    fn test_zero_request_reports_error() {
        let (source, rec, _core) = passthrough(0);
        rec.request(0);
        assert_eq!(rec.errors(), vec![FlowError::NonPositiveRequest]);
        assert!(source.subscription(0).is_cancelled());
    }

    #[test]
    fn test_at_most_one_terminal() {
        let (source, rec, _core) = passthrough(UNBOUNDED);
        source.complete();
        source.error(FlowError::upstream("late"));
        source.complete();
        source.next(9);

        assert_eq!(rec.completions(), 1);
        assert!(rec.errors().is_empty());
        assert!(rec.items().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (source, rec, core) = passthrough(5);
        rec.cancel();
        rec.cancel();
        assert!(core.is_cancelled());
        assert_eq!(source.subscription(0).cancels(), 1);

        source.next(1);
        source.complete();
        assert!(rec.items().is_empty());
        assert_eq!(rec.terminals(), 0);
    }

    #[test]
    fn test_duplicate_subscription_is_reported() {
        let (source, rec, core) = passthrough(1);
        // A misbehaving source calls on_subscribe twice on the same connection.
        let conn = Connection {
            core: Arc::clone(&core),
            generation: 1,
        };
        let extra = ManualPublisher::<u32>::new();
        extra.subscribe(Arc::new(conn));

        assert!(extra.subscription(0).is_cancelled());
        assert_eq!(rec.errors(), vec![FlowError::DuplicateSubscription]);
        assert!(source.subscription(0).is_cancelled());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let (first, rec, core) = passthrough(4);
        let second = ManualPublisher::<u32>::new();
        core.connect(&(second.clone() as PublisherRef<u32>));

        assert!(first.subscription(0).is_cancelled());
        assert_eq!(second.subscription(0).requests(), vec![4]);

        first.next(1);
        first.complete();
        second.next(2);
        assert_eq!(rec.items(), vec![2]);
        assert_eq!(rec.terminals(), 0);
    }

    #[test]
    fn test_reentrant_request_with_eager_source() {
        let rec = Recorder::<u32>::with_refill(2, 1);
        let core = DemandSubscriber::new(rec.clone(), Passthrough);
        core.connect(&(Eager::new(6) as PublisherRef<u32>));

        assert_eq!(rec.items(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(rec.completions(), 1);
        assert!(!rec.overlapped());
    }

    #[test]
    fn test_concurrent_request_and_emission_respect_demand() {
        const ROUNDS: u64 = 5_000;
        let (source, rec, _core) = passthrough(0);

        let requester = {
            let rec = Arc::clone(&rec);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    rec.request(1);
                }
            })
        };
        let emitter = {
            let source = Arc::clone(&source);
            let rec = Arc::clone(&rec);
            thread::spawn(move || {
                let mut sent = 0u64;
                while sent < ROUNDS {
                    if source.try_next(sent as u32) {
                        sent += 1;
                    }
                    assert!(rec.count() as u64 <= source.subscription(0).requests().iter().sum::<u64>());
                }
            })
        };
        requester.join().unwrap();
        emitter.join().unwrap();

        assert_eq!(rec.count() as u64, ROUNDS);
        assert!(rec.errors().is_empty());
        assert!(!rec.overlapped());
    }
}
