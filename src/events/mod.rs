//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `RetryOperator`, `RetryWhenOperator`, `TimedBackoff`,
//!   every `DemandSubscriber` whose strategy carries a bus (violations and
//!   dropped signals), `ObserverSet` workers (overflow/panic).
//! - **Consumers**: `ObserverSet::listen` fans events out to observers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
