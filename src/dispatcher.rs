//! Dispatch facade.
//!
//! [`Dispatcher`] packages one root [`Backend`] — typically a strategy,
//! optionally wrapped in admission gates — behind a small entry point.
//! Because the facade implements [`Backend`] itself, dispatchers nest: a
//! rate-limited dispatcher can sit inside another pool as an ordinary
//! backend.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{invoke_captured, Backend, SharedBackend};
use crate::balance::{LeastLoaded, Preferred, RoundRobin, WeightedRoundRobin};
use crate::clock::Clock;
use crate::result::AsyncResult;
use crate::throttle::{ConcurrencyThrottle, RateThrottle};
use crate::DispatchError;

/// Facade over a composed dispatch tree.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_backend_dispatch::{AsyncResult, Dispatcher, FnBackend};
///
/// # fn demo() -> Result<(), tokio_backend_dispatch::DispatchError> {
/// let pool: Vec<_> = (0..3)
///     .map(|i| {
///         Arc::new(FnBackend::new(
///             move |req: u32| AsyncResult::completed(req + i),
///             || true,
///         )) as Arc<dyn tokio_backend_dispatch::Backend<u32, u32>>
///     })
///     .collect();
///
/// let dispatcher = Dispatcher::least_loaded(pool)?
///     .with_concurrency_limit(64)
///     .with_rate_limit(500, Duration::from_secs(1))?;
/// let _pending = dispatcher.dispatch(7);
/// # Ok(()) }
/// ```
pub struct Dispatcher<Req, Resp> {
    root: SharedBackend<Req, Resp>,
}

impl<Req, Resp> Dispatcher<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Clone + Send + Sync + 'static,
{
    /// Wrap an already-composed backend tree.
    pub fn new(root: SharedBackend<Req, Resp>) -> Self {
        Self { root }
    }

    /// Facade over a [`LeastLoaded`] strategy.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn least_loaded(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(LeastLoaded::new(backends)?)))
    }

    /// Facade over a [`RoundRobin`] strategy.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn round_robin(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(RoundRobin::new(backends)?)))
    }

    /// Facade over a [`WeightedRoundRobin`] strategy.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty or the
    /// weight list length differs.
    pub fn weighted(
        backends: Vec<SharedBackend<Req, Resp>>,
        weights: Vec<u32>,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(WeightedRoundRobin::new(
            backends, weights,
        )?)))
    }

    /// Facade over a [`Preferred`] failover chain.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn preferred(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(Preferred::new(backends)?)))
    }

    /// Wrap the current tree in a [`ConcurrencyThrottle`].
    #[must_use]
    pub fn with_concurrency_limit(self, permits: usize) -> Self {
        Self::new(Arc::new(ConcurrencyThrottle::new(self.root, permits)))
    }

    /// Wrap the current tree in a [`RateThrottle`] on the real clock.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `window` is zero.
    pub fn with_rate_limit(
        self,
        max_per_window: u32,
        window: Duration,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(RateThrottle::new(
            self.root,
            max_per_window,
            window,
        )?)))
    }

    /// Wrap the current tree in a [`RateThrottle`] on an injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `window` is zero.
    pub fn with_rate_limit_clock(
        self,
        max_per_window: u32,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(Arc::new(RateThrottle::with_clock(
            self.root,
            max_per_window,
            window,
            clock,
        )?)))
    }

    /// Dispatch a request through the composed tree.
    ///
    /// Never blocks and never errs synchronously: selection failures, gate
    /// rejections, and backend faults all arrive through the returned
    /// result.
    pub fn dispatch(&self, req: Req) -> AsyncResult<Resp> {
        invoke_captured(&*self.root, req)
    }

    /// Health snapshot of the composed tree.
    pub fn is_healthy(&self) -> bool {
        self.root.is_healthy()
    }
}

impl<Req, Resp> Backend<Req, Resp> for Dispatcher<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Clone + Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        Ok(self.dispatch(req))
    }

    fn is_healthy(&self) -> bool {
        Dispatcher::is_healthy(self)
    }
}
