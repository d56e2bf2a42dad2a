//! # N-ary zip barrier.
//!
//! [`Zip`] subscribes to `K` sources and emits `combinator(heads)` each time
//! every source has an item ready. The combined stream ends as soon as one
//! source is exhausted (shortest-sequence semantics); partial tuples are
//! never emitted.
//!
//! ## Architecture
//! ```text
//! source[0] ──► ZipInner[0] (ArrayQueue, Prefetch) ─┐
//! source[1] ──► ZipInner[1] (ArrayQueue, Prefetch) ─┼─► drain() ──► downstream
//! just(v)   ──► Scalar (head pre-filled) ───────────┘      ▲
//!                                                          │ request(n) / cancel()
//! ```
//!
//! ## Trampoline
//! Every source `on_next`/`on_complete`/`on_error`, every downstream
//! `request` and `cancel` increments `wip` and calls `drain`. Only the caller
//! that moved `wip` from 0 runs the loop; the others return immediately and
//! their work is picked up by the running executor through `missed`. Once a
//! terminal signal is delivered the executor leaves `wip` raised, so the
//! barrier never drains again.
//!
//! ## Drain
//! 1. Cancelled → cancel sources, stop. Error stored → cancel sources, emit it.
//! 2. Fill empty head slots from the queues (replenishing upstream demand).
//!    A source with an empty head that will never deliver again completes
//!    the stream.
//! 3. All heads present and demand left → combine, emit, repeat from 2.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::FlowError;
use crate::flow::{
    get_and_add_cap, NoopSubscription, Publisher, PublisherRef, Subscriber, SubscriberRef,
    Subscription, SubscriptionRef, UNBOUNDED,
};
use crate::subscriber::Prefetch;
use crate::subscription::SwapSubscription;

type Combinator<T, V> = Arc<dyn Fn(Vec<T>) -> Result<V, FlowError> + Send + Sync>;

/// Zip of `K` homogeneous sources.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use pullstream::{from_iter, BoundedSubscriber, Sink, Zip};
///
/// let zip = Zip::new(
///     vec![from_iter([1u32, 2, 3]), from_iter([10u32, 20])],
///     |v: Vec<u32>| Ok(v[0] + v[1]),
/// );
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let out = Arc::clone(&seen);
/// let consumer = BoundedSubscriber::new(8, Arc::new(Sink::new(move |v: u32| out.lock().unwrap().push(v))));
/// consumer.subscribe_to(&(Arc::new(zip) as pullstream::PublisherRef<u32>));
/// assert_eq!(*seen.lock().unwrap(), vec![11, 22]);
/// ```
pub struct Zip<T, V> {
    sources: Vec<PublisherRef<T>>,
    combinator: Combinator<T, V>,
    prefetch: usize,
}

impl<T: Send + 'static, V: Send + 'static> Zip<T, V> {
    pub fn new(
        sources: impl IntoIterator<Item = PublisherRef<T>>,
        combinator: impl Fn(Vec<T>) -> Result<V, FlowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            combinator: Arc::new(combinator),
            prefetch: Config::default().prefetch_clamped(),
        }
    }

    /// Per-source buffer size (min 1).
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Takes the buffer size from [`Config::prefetch`].
    pub fn with_config(self, config: &Config) -> Self {
        self.with_prefetch(config.prefetch_clamped())
    }
}

impl<T: Send + 'static, V: Send + 'static> Publisher<V> for Zip<T, V> {
    fn subscribe(&self, subscriber: SubscriberRef<V>) {
        if self.sources.is_empty() {
            subscriber.on_subscribe(NoopSubscription::arc());
            subscriber.on_complete();
            return;
        }
        let barrier = ZipBarrier::new(
            subscriber,
            Arc::clone(&self.combinator),
            &self.sources,
            self.prefetch,
        );
        barrier
            .downstream
            .on_subscribe(Arc::clone(&barrier) as SubscriptionRef);
        barrier.subscribe_sources(&self.sources);
        barrier.drain();
    }
}

enum ZipState<T, V> {
    /// Single precomputed value, held in the head slot until consumed.
    Scalar,
    Buffered(Arc<ZipInner<T, V>>),
}

struct ZipBarrier<T, V> {
    downstream: SubscriberRef<V>,
    combinator: Combinator<T, V>,
    states: Box<[ZipState<T, V>]>,
    /// Current head per source; only touched by the drain executor.
    heads: Mutex<Vec<Option<T>>>,
    requested: AtomicU64,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    terminated: AtomicBool,
    error: OnceLock<FlowError>,
}

impl<T: Send + 'static, V: Send + 'static> ZipBarrier<T, V> {
    fn new(
        downstream: SubscriberRef<V>,
        combinator: Combinator<T, V>,
        sources: &[PublisherRef<T>],
        prefetch: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let mut states = Vec::with_capacity(sources.len());
            let mut heads = Vec::with_capacity(sources.len());
            for source in sources {
                match source.as_scalar() {
                    Some(value) => {
                        states.push(ZipState::Scalar);
                        heads.push(Some(value));
                    }
                    None => {
                        states.push(ZipState::Buffered(Arc::new(ZipInner::new(
                            me.clone(),
                            prefetch,
                        ))));
                        heads.push(None);
                    }
                }
            }
            Self {
                downstream,
                combinator,
                states: states.into_boxed_slice(),
                heads: Mutex::new(heads),
                requested: AtomicU64::new(0),
                wip: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                error: OnceLock::new(),
            }
        })
    }

    fn subscribe_sources(&self, sources: &[PublisherRef<T>]) {
        for (state, source) in self.states.iter().zip(sources) {
            if self.cancelled.load(Ordering::Acquire) || self.terminated.load(Ordering::Acquire) {
                return;
            }
            if let ZipState::Buffered(inner) = state {
                source.subscribe(Arc::clone(inner) as SubscriberRef<T>);
            }
        }
    }

    /// Records `error` (first one wins) and drains.
    fn fail(&self, error: FlowError) {
        if self.error.set(error).is_err() {
            debug!("zip already failed, dropping error");
        }
        self.drain();
    }

    fn cancel_sources(&self) {
        for state in self.states.iter() {
            if let ZipState::Buffered(inner) = state {
                inner.cancel();
            }
        }
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.drain_once() {
                self.terminated.store(true, Ordering::Release);
                return;
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    /// One pass of the drain loop. Returns `true` once terminal.
    fn drain_once(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            self.cancel_sources();
            self.heads.lock().clear();
            return true;
        }
        if let Some(error) = self.error.get() {
            self.cancel_sources();
            self.heads.lock().clear();
            self.downstream.on_error(error.clone());
            return true;
        }

        let requested = self.requested.load(Ordering::Acquire);
        let mut emitted = 0u64;
        let mut heads = self.heads.lock();
        loop {
            let mut ready = true;
            let mut exhausted = false;
            for (state, head) in self.states.iter().zip(heads.iter_mut()) {
                if head.is_some() {
                    continue;
                }
                match state {
                    ZipState::Scalar => exhausted = true,
                    ZipState::Buffered(inner) => {
                        // `done` is read first: an item pushed before completion
                        // is still seen by the pop below.
                        let done = inner.done.load(Ordering::Acquire);
                        match inner.queue.pop() {
                            Some(item) => {
                                *head = Some(item);
                                inner.replenish();
                            }
                            None if done => exhausted = true,
                            None => ready = false,
                        }
                    }
                }
                if exhausted {
                    break;
                }
            }
            if exhausted {
                drop(heads);
                return self.complete();
            }

            if !ready || emitted == requested {
                break;
            }

            let values: Vec<T> = heads.iter_mut().filter_map(Option::take).collect();
            let combinator = &self.combinator;
            let combined = match catch_unwind(AssertUnwindSafe(|| combinator(values))) {
                Ok(result) => result,
                Err(payload) => Err(FlowError::from_panic(&*payload)),
            };
            match combined {
                Ok(value) => {
                    self.downstream.on_next(value);
                    emitted += 1;
                }
                Err(error) => {
                    debug!(error = %error, "zip combinator failed");
                    heads.clear();
                    drop(heads);
                    self.cancel_sources();
                    let error = self.error.get_or_init(|| error).clone();
                    self.downstream.on_error(error);
                    return true;
                }
            }

            // cancel() and fail() also bump `wip`; the next pass handles them.
            if self.cancelled.load(Ordering::Acquire) || self.error.get().is_some() {
                break;
            }
        }
        drop(heads);

        if emitted > 0 && requested != UNBOUNDED {
            self.requested.fetch_sub(emitted, Ordering::AcqRel);
        }
        false
    }

    fn complete(&self) -> bool {
        trace!("zip source exhausted, completing");
        self.cancel_sources();
        self.heads.lock().clear();
        self.downstream.on_complete();
        true
    }
}

impl<T: Send + 'static, V: Send + 'static> Subscription for ZipBarrier<T, V> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.fail(FlowError::NonPositiveRequest);
            return;
        }
        get_and_add_cap(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain();
    }
}

/// Buffered state of one asynchronous source.
struct ZipInner<T, V> {
    parent: Weak<ZipBarrier<T, V>>,
    queue: ArrayQueue<T>,
    done: AtomicBool,
    upstream: SwapSubscription,
    prefetch: Prefetch,
}

impl<T: Send + 'static, V: Send + 'static> ZipInner<T, V> {
    fn new(parent: Weak<ZipBarrier<T, V>>, prefetch: usize) -> Self {
        Self {
            parent,
            queue: ArrayQueue::new(prefetch),
            done: AtomicBool::new(false),
            upstream: SwapSubscription::new(),
            prefetch: Prefetch::new(prefetch),
        }
    }

    /// Accounts one item moved out of the queue; refills upstream at the limit.
    fn replenish(&self) {
        if let Some(n) = self.prefetch.consumed() {
            self.upstream.request(n);
        }
    }

    fn cancel(&self) {
        self.upstream.cancel();
        while self.queue.pop().is_some() {}
    }
}

impl<T: Send + 'static, V: Send + 'static> Subscriber<T> for ZipInner<T, V> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.upstream.swap_to(subscription) {
            self.upstream.request(self.prefetch.initial());
        } else if !self.upstream.is_cancelled() {
            if let Some(parent) = self.parent.upgrade() {
                parent.fail(FlowError::DuplicateSubscription);
            }
        }
    }

    fn on_next(&self, item: T) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        if self.done.load(Ordering::Acquire) || self.upstream.is_cancelled() {
            return;
        }
        if self.queue.push(item).is_err() {
            parent.fail(FlowError::Overflow {
                capacity: self.queue.capacity(),
            });
            return;
        }
        parent.drain();
    }

    fn on_error(&self, error: FlowError) {
        if let Some(parent) = self.parent.upgrade() {
            parent.fail(error);
        }
    }

    fn on_complete(&self) {
        self.done.store(true, Ordering::Release);
        if let Some(parent) = self.parent.upgrade() {
            parent.drain();
        }
    }
}

enum Either<A, B> {
    Left(A),
    Right(B),
}

/// Maps every item of `source` through a plain function.
struct Lift<X, E> {
    source: PublisherRef<X>,
    wrap: fn(X) -> E,
}

impl<X: Send + 'static, E: Send + 'static> Publisher<E> for Lift<X, E> {
    fn subscribe(&self, subscriber: SubscriberRef<E>) {
        self.source.subscribe(Arc::new(LiftSubscriber {
            downstream: subscriber,
            wrap: self.wrap,
            _marker: PhantomData,
        }));
    }

    fn as_scalar(&self) -> Option<E> {
        self.source.as_scalar().map(self.wrap)
    }
}

struct LiftSubscriber<X, E> {
    downstream: SubscriberRef<E>,
    wrap: fn(X) -> E,
    _marker: PhantomData<fn(X)>,
}

impl<X: Send + 'static, E: Send + 'static> Subscriber<X> for LiftSubscriber<X, E> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&self, item: X) {
        self.downstream.on_next((self.wrap)(item));
    }

    fn on_error(&self, error: FlowError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

/// Zips two sources of different item types.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use pullstream::{from_iter, zip2, BoundedSubscriber, Sink};
///
/// let pairs = zip2(from_iter([1u32, 2, 3]), from_iter(['a', 'b']), |n, c| (n, c));
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let out = Arc::clone(&seen);
/// BoundedSubscriber::new(4, Arc::new(Sink::new(move |p: (u32, char)| out.lock().unwrap().push(p))))
///     .subscribe_to(&pairs);
/// assert_eq!(*seen.lock().unwrap(), vec![(1, 'a'), (2, 'b')]);
/// ```
pub fn zip2<A, B, V, F>(a: PublisherRef<A>, b: PublisherRef<B>, f: F) -> PublisherRef<V>
where
    A: Send + 'static,
    B: Send + 'static,
    V: Send + 'static,
    F: Fn(A, B) -> V + Send + Sync + 'static,
{
    let left: PublisherRef<Either<A, B>> = Arc::new(Lift {
        source: a,
        wrap: Either::Left as fn(A) -> Either<A, B>,
    });
    let right: PublisherRef<Either<A, B>> = Arc::new(Lift {
        source: b,
        wrap: Either::Right as fn(B) -> Either<A, B>,
    });
    Arc::new(Zip::new([left, right], move |mut values: Vec<Either<A, B>>| {
        let second = values.pop();
        let first = values.pop();
        match (first, second) {
            (Some(Either::Left(a)), Some(Either::Right(b))) => Ok(f(a, b)),
            _ => Err(FlowError::combinator("zip2 received misaligned values")),
        }
    }))
}
