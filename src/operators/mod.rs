//! # Operators built on the demand-tracking core.
//!
//! Every operator is a [`Publisher`](crate::Publisher) wrapping one or more
//! sources. On subscribe it builds a
//! [`DemandSubscriber`](crate::DemandSubscriber) with its own
//! [`Strategy`](crate::Strategy), except [`Zip`] which runs its own barrier.
//!
//! | Operator                | Behavior                                             |
//! |-------------------------|------------------------------------------------------|
//! | [`RetryOperator`]       | resubscribes immediately per [`RetryPolicy`](crate::RetryPolicy) |
//! | [`RetryWhenOperator`]   | resubscribes on each signal of a companion stream    |
//! | [`TimedBackoff`]        | companion emitting after policy delays               |
//! | [`Zip`] / [`zip2`]      | combines heads of `K` sources, shortest wins         |
//! | [`ThrottleOperator`]    | one upstream request per period                      |
//! | [`RequestWhenOperator`] | upstream demand shaped by a companion stream         |
//! | [`SwitchIfEmpty`]       | falls back to another source when empty              |

mod backoff;
mod request_when;
mod retry;
mod retry_when;
mod switch_if_empty;
mod throttle;
mod zip;

pub use backoff::{retry_backoff, TimedBackoff};
pub use request_when::RequestWhenOperator;
pub use retry::RetryOperator;
pub use retry_when::RetryWhenOperator;
pub use switch_if_empty::SwitchIfEmpty;
pub use throttle::ThrottleOperator;
pub use zip::{zip2, Zip};
