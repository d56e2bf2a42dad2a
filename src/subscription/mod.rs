//! Upstream subscription holders.
//!
//! - [`SwapSubscription`] replaceable upstream cell preserving unsatisfied demand

mod swap;

pub use swap::SwapSubscription;
