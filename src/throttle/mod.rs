//! Admission gates.
//!
//! A gate wraps a single [`Backend`] and decides, before forwarding,
//! whether a call may proceed. Rejection is surfaced as an
//! immediately-cancelled result, never as a failure: callers treat
//! throttling the same way they treat an explicit cancellation.
//!
//! - [`ConcurrencyThrottle`] — bounded concurrent in-flight calls.
//! - [`RateThrottle`] — bounded calls per time window.
//!
//! [`Backend`]: crate::backend::Backend

mod concurrency;
mod rate;

pub use concurrency::ConcurrencyThrottle;
pub use rate::RateThrottle;
