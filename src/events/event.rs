//! # Runtime events emitted by operators and observer workers.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Resubscription events**: retry decisions and backoff scheduling
//! - **Protocol events**: violations and late signals dropped by operators
//! - **Observer events**: panics and overflow inside observer workers
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use pullstream::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_operator("retry_when")
//!     .with_reason("upstream failed: io")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_millis(400));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.operator.as_deref(), Some("retry_when"));
//! assert_eq!(ev.delay_ms, Some(400));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Resubscription events ===
    /// Operator is resubscribing to its source after an error.
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `attempt`: retry number (1-based)
    /// - `reason`: the error that triggered the retry
    Resubscribing,

    /// Retry policy gave up; the error is propagated downstream.
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `attempt`: failed retry number
    /// - `reason`: the propagated error
    RetryExhausted,

    /// Backoff stream scheduled the next resubscription.
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `attempt`: retry number (1-based)
    /// - `delay_ms`: delay before the retry signal (ms)
    /// - `reason`: the error being retried
    BackoffScheduled,

    /// Backoff stream ran out of retries and completed.
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `attempt`: number of errors observed
    /// - `reason`: the last error
    BackoffExhausted,

    // === Protocol events ===
    /// A party broke the protocol (zero request, duplicate subscription,
    /// item without demand).
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `reason`: violation details
    ProtocolViolation,

    /// A signal arrived after termination or from a replaced connection.
    ///
    /// Sets:
    /// - `operator`: operator name
    /// - `reason`: signal name (`on_next`, `on_error`, `on_complete`)
    SignalDropped,

    // === Observer events ===
    /// Observer panicked during event processing.
    ///
    /// Sets:
    /// - `operator`: observer name
    /// - `reason`: panic info/message
    ObserverPanicked,

    /// Observer dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `operator`: observer name
    /// - `reason`: reason string (e.g., "full", "closed")
    ObserverOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the operator (or observer) that raised the event.
    pub operator: Option<Arc<str>>,
    /// Retry attempt (starting from 1).
    pub attempt: Option<u64>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            operator: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the operator name.
    #[inline]
    pub fn with_operator(mut self, operator: impl Into<Arc<str>>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_operator(observer)
            .with_reason(format!("observer={observer} reason={reason}"))
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_operator(observer)
            .with_reason(info)
    }

    #[inline]
    pub fn is_observer_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ObserverOverflow)
    }
}
