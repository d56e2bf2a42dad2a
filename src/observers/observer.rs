//! # Observer: user-facing event handlers.
//!
//! [`Observe`] is the extension point for everything that wants to react to
//! runtime [`Event`]s: metrics export, alerting, structured logging.
//!
//! Each observer gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-observer bounded queue** (capacity via [`Observe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::ObserverPanicked`)
//!
//! ## Architecture
//! ```text
//! Bus ──► ObserverSet::listen ──► [bounded queue] ──► worker task ──► observer.on_event()
//!                                                   └─► panic caught → EventKind::ObserverPanicked
//! ```
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use pullstream::{Event, EventKind, Observe};
//!
//! struct RetryCounter;
//!
//! #[async_trait]
//! impl Observe for RetryCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::Resubscribing) {
//!             // bump a counter, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "retry_counter" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event observer for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this observer's queue.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per observer.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
