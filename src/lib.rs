//! # tokio-backend-dispatch
//!
//! Client-side request dispatch over a pool of interchangeable backends.
//!
//! ## Architecture
//!
//! Three layers compose behind one [`Backend`] contract:
//! ```text
//! Dispatcher → gates (ConcurrencyThrottle, RateThrottle)
//!            → strategy (RoundRobin | LeastLoaded | WeightedRoundRobin | Preferred)
//!            → backends
//! ```
//! Every call yields an [`AsyncResult`] — a single-assignment cell with
//! listeners, idempotent terminal transitions, and bidirectional
//! cancellation between the caller-facing and backend-facing sides.
//! Strategies are thin: they select, they never retry, and they pass backend
//! errors through unmodified.

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod balance;
pub mod clock;
pub mod dispatcher;
pub mod result;
pub mod throttle;

// Re-exports for convenience
pub use backend::{invoke_captured, Backend, FnBackend, SharedBackend, TaskBackend};
pub use balance::{LeastLoaded, Preferred, RoundRobin, WeightedRoundRobin};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use dispatcher::Dispatcher;
pub use result::{link, AsyncResult, IdempotentAction, Outcome};
pub use throttle::{ConcurrencyThrottle, RateThrottle};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=debug`).
///
/// # Errors
///
/// Returns [`DispatchError::Config`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
pub fn init_tracing() -> Result<(), DispatchError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| DispatchError::Config(format!("tracing init failed: {e}")))
}

/// Errors surfaced by the dispatch layer.
///
/// The enum is `Clone` because a terminal [`AsyncResult`] may be observed by
/// any number of waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No candidate passed its health snapshot at selection time.
    #[error("no healthy backend available")]
    NoHealthyBackend,

    /// The call was cancelled — by the caller, by the backend, or by an
    /// admission gate rejecting it. The three are intentionally
    /// indistinguishable by kind.
    #[error("call cancelled")]
    Cancelled,

    /// The backend call itself failed. Propagated to the caller unmodified;
    /// a backend failure never marks the backend unhealthy by itself.
    #[error("backend call failed: {0}")]
    Backend(String),

    /// A construction argument is invalid (empty backend list, mismatched
    /// weight list, out-of-range starting cursor, zero rate window).
    ///
    /// Returned at construction time so that misconfiguration surfaces
    /// immediately rather than at the first dispatch.
    #[error("configuration error: {0}")]
    Config(String),
}
