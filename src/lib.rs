//! # pullstream
//!
//! **Pullstream** is a demand-driven reactive stream core for Rust.
//!
//! It implements the publisher/subscriber/subscription protocol with exact
//! backpressure accounting, and builds the stateful operators that are hard
//! to get right on top of it: resubscription on error, companion-driven
//! retry and demand shaping, and an n-ary zip with bounded prefetch.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Publisher   │   │  Publisher   │   │  Publisher   │
//!     │ (from_iter)  │   │ (user code)  │   │   (just)     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Operators                                                        │
//! │  - DemandSubscriber + Strategy (retry, retry_when, throttle, ...) │
//! │  - SwapSubscription (replaceable upstream, demand carried over)   │
//! │  - ZipBarrier (per-source prefetch queues)                        │
//! └──────┬──────────────────────────────────────────────────┬────────┘
//!        │ on_next / on_error / on_complete                 │ publish
//!        ▼                                                  ▼
//! ┌──────────────────────────┐              ┌───────────────────────────┐
//! │  BoundedSubscriber/Sink  │              │  Bus (broadcast channel)  │
//! │  (prefetch window)       │              │  (Config::bus_capacity)   │
//! └──────────────────────────┘              └─────────────┬─────────────┘
//!                                                         ▼
//!                                               ┌──────────────────┐
//!                                               │   ObserverSet    │
//!                                               │ (per-obs queues) │
//!                                               └──┬──────┬─────┬──┘
//!                                                  ▼      ▼     ▼
//!                                              worker1 worker2 workerN
//! ```
//!
//! ### Demand flow
//! ```text
//! downstream.request(n) ──► DemandSubscriber
//!   ├─► requested += n (saturating at UNBOUNDED)
//!   ├─► Strategy::on_request
//!   │       ├─ Passthrough ─► SwapSubscription.request(n) ─► upstream
//!   │       ├─ Throttled   ─► one request per period
//!   │       └─ Gated       ─► companion decides
//!   └─► upstream.on_next(item)
//!           ├─ requested > 0  ─► requested -= 1, downstream.on_next
//!           └─ requested == 0 ─► MissingDemand, cancel upstream
//!
//! upstream.on_error(e) ──► Strategy::on_error
//!   ├─ retry allowed ─► connect(source) with remaining demand
//!   └─ otherwise     ─► downstream.on_error(e)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Protocol**      | Publisher/subscriber/subscription roles and demand arithmetic.| [`Publisher`], [`Subscriber`], [`Subscription`] |
//! | **Core**          | Demand-tracking subscriber with pluggable per-operator hooks.  | [`DemandSubscriber`], [`Strategy`]          |
//! | **Operators**     | Retry, companion-driven retry, throttle, zip, fallback.        | [`RetryOperator`], [`RetryWhenOperator`], [`Zip`] |
//! | **Policies**      | Retry limits and predicates, backoff with jitter.              | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Timers**        | Injected scheduling, manual for tests, tokio at runtime.       | [`Timer`], [`ManualTimer`], [`TokioTimer`]  |
//! | **Events**        | Resubscription and protocol events on a broadcast bus.         | [`Event`], [`Bus`], [`Observe`]             |
//! | **Errors**        | Typed stream errors.                                          | [`FlowError`]                               |
//! | **Configuration** | Prefetch and bus sizes.                                       | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] observer _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use pullstream::{from_iter, BoundedSubscriber, PublisherRef, RetryOperator, RetryPolicy, Sink};
//!
//! // Retry the source up to three times, consume it with a prefetch window of 4.
//! let source = from_iter(1u32..=10);
//! let retried: PublisherRef<u32> = Arc::new(RetryOperator::new(source, RetryPolicy::times(3)));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let out = Arc::clone(&seen);
//! let sink = Sink::new(move |v: u32| out.lock().unwrap().push(v));
//!
//! let consumer = BoundedSubscriber::new(4, Arc::new(sink));
//! consumer.subscribe_to(&retried);
//! assert_eq!(seen.lock().unwrap().len(), 10);
//! assert!(consumer.is_terminated());
//! ```
mod config;
mod error;
mod events;
mod flow;
mod observers;
mod operators;
mod policies;
mod sources;
mod subscriber;
mod subscription;
mod timer;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use config::Config;
pub use error::FlowError;
pub use events::{Bus, Event, EventKind};
pub use flow::{
    add_cap, consume, get_and_add_cap, sub_saturating, Broadcaster, NoopSubscription, Publisher,
    PublisherRef, Subscriber, SubscriberRef, Subscription, SubscriptionRef, UNBOUNDED,
};
pub use observers::{Observe, ObserverSet};
pub use operators::{
    retry_backoff, zip2, RequestWhenOperator, RetryOperator, RetryWhenOperator, SwitchIfEmpty,
    ThrottleOperator, TimedBackoff, Zip,
};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use sources::{empty, fail, from_iter, just, FromIter};
pub use subscriber::{
    Bounded, BoundedSubscriber, DemandSubscriber, Passthrough, Prefetch, Sink, Strategy,
};
pub use subscription::SwapSubscription;
pub use timer::{ManualTimer, Timer, TimerHandle, TimerRef, TimerTask, TokioTimer};

// Optional: expose a simple built-in logging observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;
