//! Demand-tracking subscribers.
//!
//! ## Contents
//! - [`DemandSubscriber`] generic coordinator every operator is built on
//! - [`Strategy`] per-operator hooks, [`Passthrough`] the identity strategy
//! - [`Prefetch`], [`BoundedSubscriber`] sliding-window prefetch
//! - [`Sink`] callback subscriber for the end of a pipeline

mod bounded;
mod demand;
mod emitter;

pub use bounded::{Bounded, BoundedSubscriber, Prefetch, Sink};
pub use demand::{DemandSubscriber, Passthrough, Strategy};
