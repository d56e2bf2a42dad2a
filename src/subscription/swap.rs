//! # Swappable upstream subscription.
//!
//! [`SwapSubscription`] is the indirection cell operators hold instead of the
//! raw upstream subscription. It lets an operator replace its upstream
//! mid-stream (retry, switch-if-empty) without losing demand.
//!
//! ## State machine
//! ```text
//!               swap_to(s)                 cancel()
//! Uninitialized ──────────► Active(s) ──────────────► Cancelled
//!      ▲  │                    │                         ▲
//!      │  └── request(n) ──► pending += n                │
//!      │                       │ rearm()                 │
//!      └───────────────────────┘ (cancels s,             │
//!         pending := outstanding)                        │
//!      └──────────────────── cancel() ───────────────────┘
//! ```
//!
//! ## Rules
//! - `swap_to` while `Active` cancels the newcomer and keeps the installed one.
//! - `swap_to` while `Cancelled` cancels the newcomer; `Cancelled` is absorbing.
//! - The first install receives all pending demand in a single `request`.
//! - `rearm` re-arms the cell so the next install is re-requested exactly
//!   the demand the previous subscription left unsatisfied.
//!
//! ## Concurrency
//! No locks. The state tag is moved with compare-and-swap, so `swap_to` and
//! `rearm` decide synchronously. Everything else (requests, produced counts,
//! a newly installed subscription, a rearm) is recorded in `missed_*` slots
//! and applied by whichever thread moves `wip` from zero:
//! ```text
//! request(n) ──► missed_requested += n ──┐
//! produced(n) ─► missed_produced += n ───┼──► drain (single executor)
//! swap_to(s) ──► missed_subscription = s ┤      ├─ outstanding += requested - produced
//! rearm() ─────► missed_rearm = true ────┘      ├─ cancel displaced subscription
//!                                               └─ forward demand to the active one
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{trace, warn};

use crate::flow::{add_cap, Subscription, SubscriptionRef, UNBOUNDED};

const UNINITIALIZED: u8 = 0;
const ACTIVE: u8 = 1;
const CANCELLED: u8 = 2;

/// Atomic indirection cell for the active upstream subscription.
pub struct SwapSubscription {
    state: AtomicU8,
    wip: AtomicUsize,
    missed_requested: AtomicU64,
    missed_produced: AtomicU64,
    missed_subscription: ArcSwapOption<SubscriptionRef>,
    missed_rearm: AtomicBool,
    /// Subscription receiving demand; only replaced by the drain executor.
    actual: ArcSwapOption<SubscriptionRef>,
    /// Requested from upstream but not yet produced; only written by the drain executor.
    outstanding: AtomicU64,
}

impl SwapSubscription {
    /// Creates an uninitialized cell with no pending demand.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            wip: AtomicUsize::new(0),
            missed_requested: AtomicU64::new(0),
            missed_produced: AtomicU64::new(0),
            missed_subscription: ArcSwapOption::empty(),
            missed_rearm: AtomicBool::new(false),
            actual: ArcSwapOption::empty(),
            outstanding: AtomicU64::new(0),
        }
    }

    /// Installs `next` as the active subscription.
    ///
    /// Returns `false` (and cancels `next`) if a subscription is already
    /// active or the cell was cancelled.
    pub fn swap_to(&self, next: SubscriptionRef) -> bool {
        if let Err(current) =
            self.state
                .compare_exchange(UNINITIALIZED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
        {
            if current == ACTIVE {
                warn!("duplicate subscription install, cancelling the newcomer");
            }
            next.cancel();
            return false;
        }
        if let Some(stale) = self.missed_subscription.swap(Some(Arc::new(next))) {
            stale.cancel();
        }
        self.drain();
        true
    }

    /// Moves an active cell back to uninitialized for resubscription.
    ///
    /// The displaced subscription is cancelled and the demand it left
    /// unsatisfied becomes pending for the next install. Returns `false`
    /// if the cell is cancelled. Callers serialize `rearm` with the
    /// `swap_to` of the replacement.
    pub fn rearm(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == CANCELLED {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                UNINITIALIZED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if let Some(queued) = self.missed_subscription.swap(None) {
            queued.cancel();
        }
        self.missed_rearm.store(true, Ordering::Release);
        self.drain();
        true
    }

    /// Records `n` items received from the current subscription.
    pub fn produced(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.missed_produced.fetch_add(n, Ordering::AcqRel);
        self.drain();
    }

    /// Whether the cell reached its terminal state.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Whether no subscription is installed (and the cell is not cancelled).
    pub fn is_unsubscribed(&self) -> bool {
        self.state.load(Ordering::Acquire) == UNINITIALIZED
    }

    /// Demand waiting for the next install.
    pub fn pending(&self) -> u64 {
        if self.is_unsubscribed() {
            self.outstanding()
        } else {
            0
        }
    }

    /// Demand requested upstream and not yet produced.
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
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
        if self.is_cancelled() {
            self.missed_requested.store(0, Ordering::Release);
            self.missed_rearm.store(false, Ordering::Release);
            if let Some(queued) = self.missed_subscription.swap(None) {
                queued.cancel();
            }
            if let Some(active) = self.actual.swap(None) {
                active.cancel();
            }
            return;
        }

        let requested = self.missed_requested.swap(0, Ordering::AcqRel);
        let produced = self.missed_produced.swap(0, Ordering::AcqRel);
        let mut outstanding = add_cap(self.outstanding.load(Ordering::Acquire), requested);
        if outstanding != UNBOUNDED {
            outstanding = outstanding.saturating_sub(produced);
        }
        self.outstanding.store(outstanding, Ordering::Release);

        if self.missed_rearm.swap(false, Ordering::AcqRel) {
            if let Some(displaced) = self.actual.swap(None) {
                displaced.cancel();
            }
        }

        if let Some(next) = self.missed_subscription.swap(None) {
            self.actual.store(Some(Arc::clone(&next)));
            if outstanding > 0 {
                trace!(outstanding, "delivering pending demand to new subscription");
                next.request(outstanding);
            }
        } else if requested > 0 {
            if let Some(active) = self.actual.load_full() {
                active.request(requested);
            }
        }
    }
}

impl Default for SwapSubscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription for SwapSubscription {
    fn request(&self, n: u64) {
        if n == 0 || self.is_cancelled() {
            return;
        }
        let mut current = self.missed_requested.load(Ordering::Acquire);
        loop {
            let next = add_cap(current, n);
            match self.missed_requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.state.swap(CANCELLED, Ordering::AcqRel) == CANCELLED {
            return;
        }
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::flow::{Publisher, Subscriber};
    use crate::test_support::{ManualPublisher, ManualSubscription};
    use std::thread;

    /// Subscriber that installs whatever it receives into a shared cell.
    struct Installer(Arc<SwapSubscription>);

    impl Subscriber<u8> for Installer {
        fn on_subscribe(&self, s: SubscriptionRef) {
            self.0.swap_to(s);
        }
        fn on_next(&self, _: u8) {}
        fn on_error(&self, _: FlowError) {}
        fn on_complete(&self) {}
    }

    fn attach(cell: &Arc<SwapSubscription>, source: &ManualPublisher<u8>) -> Arc<ManualSubscription> {
        source.subscribe(Arc::new(Installer(Arc::clone(cell))));
        source.subscription(source.subscriptions() - 1)
    }

    #[test]
    fn test_pending_demand_is_delivered_once_summed() {
        let cell = Arc::new(SwapSubscription::new());
        cell.request(2);
        cell.request(3);
        assert_eq!(cell.pending(), 5);

        let source = ManualPublisher::new();
        let sub = attach(&cell, &source);
        assert_eq!(sub.requests(), vec![5]);
        assert_eq!(cell.pending(), 0);

        cell.request(4);
        assert_eq!(sub.requests(), vec![5, 4]);
    }

    #[test]
    fn test_duplicate_install_cancels_newcomer() {
        let cell = Arc::new(SwapSubscription::new());
        let source = ManualPublisher::new();
        let first = attach(&cell, &source);
        let second = attach(&cell, &source);

        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());

        cell.request(1);
        assert_eq!(first.requests(), vec![1]);
        assert!(second.requests().is_empty());
    }

    #[test]
    fn test_cancel_is_absorbing_and_idempotent() {
        let cell = Arc::new(SwapSubscription::new());
        let source = ManualPublisher::new();
        let first = attach(&cell, &source);

        cell.cancel();
        cell.cancel();
        assert!(cell.is_cancelled());
        assert_eq!(first.cancels(), 1);

        let late = attach(&cell, &source);
        assert!(late.is_cancelled());
        cell.request(3);
        assert!(late.requests().is_empty());
        assert!(!cell.rearm());
    }

    #[test]
    fn test_cancel_before_install() {
        let cell = Arc::new(SwapSubscription::new());
        cell.request(9);
        cell.cancel();
        assert_eq!(cell.pending(), 0);
        assert!(!cell.is_unsubscribed());
    }

    #[test]
    fn test_rearm_rerequests_unsatisfied_demand() {
        let cell = Arc::new(SwapSubscription::new());
        let source = ManualPublisher::new();
        let first = attach(&cell, &source);
        cell.request(10);
        cell.produced(4);
        assert_eq!(cell.outstanding(), 6);

        assert!(cell.rearm());
        assert!(first.is_cancelled());
        assert!(cell.is_unsubscribed());

        let second = attach(&cell, &source);
        assert_eq!(second.requests(), vec![6]);
    }

    #[test]
    fn test_concurrent_requests_racing_install_arrive_exactly_once() {
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 2_000;

        let cell = Arc::new(SwapSubscription::new());
        let source = ManualPublisher::new();
        let requesters: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        cell.request(1);
                    }
                })
            })
            .collect();

        let sub = attach(&cell, &source);
        for handle in requesters {
            handle.join().unwrap();
        }

        assert_eq!(sub.requests().iter().sum::<u64>(), THREADS * PER_THREAD);
        assert_eq!(cell.outstanding(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_cancel_racing_install_never_leaks_a_live_subscription() {
        for _ in 0..500 {
            let cell = Arc::new(SwapSubscription::new());
            let source = ManualPublisher::new();
            let canceller = {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.cancel())
            };
            let sub = attach(&cell, &source);
            canceller.join().unwrap();

            assert!(cell.is_cancelled());
            assert_eq!(sub.cancels(), 1);
        }
    }
}
