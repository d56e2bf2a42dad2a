//! Error types carried through the `on_error` channel.
//!
//! Every failure in a pipeline travels downstream as a [`FlowError`]: the
//! protocol mandates that errors use the same channel as data, so nothing in
//! this crate panics or returns a failure to the caller of `request`/`on_next`.
//!
//! The variants fall into three groups:
//! - **protocol violations**: non-positive request, duplicate subscription,
//!   item without demand, prefetch overflow;
//! - **upstream failures**: raised by a source ([`FlowError::Upstream`]);
//! - **user-function failures**: a combinator returned an error or panicked
//!   ([`FlowError::Combinator`]).

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// # Errors delivered through `Subscriber::on_error`.
///
/// Cheap to clone: reasons are stored as `Arc<str>` so the same error can be
/// fanned out to a retry companion and the downstream without copying.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// `request(0)` was issued; demand must be strictly positive.
    #[error("request amount must be positive")]
    NonPositiveRequest,

    /// A second upstream subscription arrived while one was already active.
    #[error("subscription already installed")]
    DuplicateSubscription,

    /// The producer delivered an item that no one requested.
    #[error("item delivered without outstanding demand")]
    MissingDemand,

    /// A source pushed more items than its prefetch window allows.
    #[error("prefetch buffer of {capacity} items overflowed")]
    Overflow {
        /// Size of the buffer that overflowed.
        capacity: usize,
    },

    /// The source itself failed.
    #[error("upstream failed: {reason}")]
    Upstream {
        /// Source-provided description.
        reason: Arc<str>,
    },

    /// A user-supplied combinator failed or panicked.
    #[error("combinator failed: {reason}")]
    Combinator {
        /// Returned error or panic payload.
        reason: Arc<str>,
    },
}

impl FlowError {
    /// Shorthand for [`FlowError::Upstream`].
    pub fn upstream(reason: impl Into<Arc<str>>) -> Self {
        FlowError::Upstream {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`FlowError::Combinator`].
    pub fn combinator(reason: impl Into<Arc<str>>) -> Self {
        FlowError::Combinator {
            reason: reason.into(),
        }
    }

    /// Converts a caught panic payload into a [`FlowError::Combinator`].
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        FlowError::combinator(format!("panicked: {}", panic_message(payload)))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pullstream::FlowError;
    ///
    /// assert_eq!(FlowError::MissingDemand.as_label(), "flow_missing_demand");
    /// assert_eq!(FlowError::upstream("io").as_label(), "flow_upstream");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FlowError::NonPositiveRequest => "flow_non_positive_request",
            FlowError::DuplicateSubscription => "flow_duplicate_subscription",
            FlowError::MissingDemand => "flow_missing_demand",
            FlowError::Overflow { .. } => "flow_overflow",
            FlowError::Upstream { .. } => "flow_upstream",
            FlowError::Combinator { .. } => "flow_combinator",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            FlowError::NonPositiveRequest => "request(n) called with n == 0".to_string(),
            FlowError::DuplicateSubscription => "duplicate on_subscribe".to_string(),
            FlowError::MissingDemand => "on_next without demand".to_string(),
            FlowError::Overflow { capacity } => format!("overflow: capacity={capacity}"),
            FlowError::Upstream { reason } => format!("upstream: {reason}"),
            FlowError::Combinator { reason } => format!("combinator: {reason}"),
        }
    }

    /// Indicates whether the error reports a broken protocol contract rather
    /// than a failure of the data source or a user function.
    ///
    /// # Example
    /// ```
    /// use pullstream::FlowError;
    ///
    /// assert!(FlowError::NonPositiveRequest.is_protocol_violation());
    /// assert!(!FlowError::upstream("boom").is_protocol_violation());
    /// ```
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FlowError::NonPositiveRequest
                | FlowError::DuplicateSubscription
                | FlowError::MissingDemand
                | FlowError::Overflow { .. }
        )
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
