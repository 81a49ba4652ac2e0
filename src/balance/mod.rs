//! Backend selection strategies.
//!
//! Every strategy consumes an ordered pool of [`Backend`]s and implements
//! [`Backend`] itself, so strategies compose with the admission gates in
//! [`crate::throttle`] and with each other. Selection re-checks each
//! candidate's health snapshot fresh on every call and never caches it.
//!
//! - [`RoundRobin`] — rotation cursor, first healthy backend after it.
//! - [`LeastLoaded`] — fewest outstanding calls, cursor-ordered tie-break.
//! - [`WeightedRoundRobin`] — lowest attempted-to-weight cost.
//! - [`Preferred`] — strict-priority failover down an ordered list.
//!
//! [`Backend`]: crate::backend::Backend

mod least_loaded;
mod preferred;
mod round_robin;
mod weighted;

pub use least_loaded::LeastLoaded;
pub use preferred::Preferred;
pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;
