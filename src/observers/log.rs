//! # Tracing-backed observer for debugging and demos.
//!
//! [`LogWriter`] renders every [`Event`] as a `tracing` record under the
//! `pullstream::events` target. Install any subscriber (e.g.
//! `tracing_subscriber::fmt`) to see the output:
//!
//! ```text
//! INFO  pullstream::events: resubscribing operator="retry" attempt=1 reason="upstream: io"
//! INFO  pullstream::events: backoff scheduled operator="timed_backoff" attempt=2 delay_ms=200
//! WARN  pullstream::events: protocol violation operator="bounded" reason="on_next without demand"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Observe;
use crate::events::{Event, EventKind};

/// Logging observer. Enabled via the `logging` feature.
pub struct LogWriter;

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let operator = e.operator.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::Resubscribing => {
                info!(target: "pullstream::events", operator, attempt = ?e.attempt, reason, "resubscribing");
            }
            EventKind::RetryExhausted => {
                warn!(target: "pullstream::events", operator, attempt = ?e.attempt, reason, "retry exhausted");
            }
            EventKind::BackoffScheduled => {
                info!(target: "pullstream::events", operator, attempt = ?e.attempt, delay_ms = ?e.delay_ms, "backoff scheduled");
            }
            EventKind::BackoffExhausted => {
                warn!(target: "pullstream::events", operator, attempt = ?e.attempt, reason, "backoff exhausted");
            }
            EventKind::ProtocolViolation => {
                warn!(target: "pullstream::events", operator, reason, "protocol violation");
            }
            EventKind::SignalDropped => {
                debug!(target: "pullstream::events", operator, signal = reason, "signal dropped");
            }
            EventKind::ObserverPanicked => {
                warn!(target: "pullstream::events", observer = operator, reason, "observer panicked");
            }
            EventKind::ObserverOverflow => {
                warn!(target: "pullstream::events", observer = operator, reason, "observer overflow");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
