//! # Event observers.
//!
//! ```text
//! Operators ── publish(Event) ──► Bus ──► ObserverSet::listen
//!                                              │
//!                         ┌────────────────────┼────────────────────┐
//!                         ▼                    ▼                    ▼
//!                     LogWriter           MetricsObserver      CustomObserver
//!                     (tracing)         (Prometheus, OTEL)      (user logic)
//! ```
//!
//! - [`Observe`] extension trait
//! - [`ObserverSet`] per-observer queues, worker tasks and panic isolation
//! - [`LogWriter`] renders events through `tracing` (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod observer;
mod set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observer::Observe;
pub use set::ObserverSet;
