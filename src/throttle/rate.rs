//! Rate-limiting admission gate.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, SharedBackend};
use crate::clock::{Clock, MonotonicClock};
use crate::result::AsyncResult;
use crate::DispatchError;

/// Caps calls per time window against one backend.
///
/// Windows are derived from an injected monotonic [`Clock`]:
/// `window_index = now / window`. The first caller to observe an advanced
/// index resets the admitted counter; the reset is best-effort, so a short
/// race at a window boundary may under- or slightly over-admit. Admission
/// itself is a compare-and-swap increment loop and never over-admits within
/// an observed window.
///
/// Rejected calls get an immediately-cancelled result, indistinguishable by
/// kind from an explicit cancellation.
pub struct RateThrottle<Req, Resp> {
    backend: SharedBackend<Req, Resp>,
    max_per_window: u32,
    window_nanos: u64,
    clock: Arc<dyn Clock>,
    admitted: AtomicU32,
    window_seen: AtomicU64,
}

impl<Req, Resp> RateThrottle<Req, Resp> {
    /// Wrap `backend`, admitting at most `max_per_window` calls per
    /// `window`, timed by the real monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `window` is zero.
    pub fn new(
        backend: SharedBackend<Req, Resp>,
        max_per_window: u32,
        window: Duration,
    ) -> Result<Self, DispatchError> {
        Self::with_clock(backend, max_per_window, window, Arc::new(MonotonicClock::new()))
    }

    /// Same as [`new`](Self::new) with an explicit clock, for deterministic
    /// tests.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `window` is zero.
    pub fn with_clock(
        backend: SharedBackend<Req, Resp>,
        max_per_window: u32,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DispatchError> {
        if window.is_zero() {
            return Err(DispatchError::Config(
                "rate window must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            backend,
            max_per_window,
            window_nanos: window.as_nanos() as u64,
            clock,
            admitted: AtomicU32::new(0),
            window_seen: AtomicU64::new(0),
        })
    }

    /// Reset the admitted counter if the clock has moved into a new window.
    fn roll_window(&self) {
        let index = self.clock.now().as_nanos() as u64 / self.window_nanos;
        let seen = self.window_seen.load(Ordering::SeqCst);
        if seen != index
            && self
                .window_seen
                .compare_exchange(seen, index, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.admitted.store(0, Ordering::SeqCst);
        }
    }

    fn try_acquire(&self) -> bool {
        self.roll_window();
        loop {
            let used = self.admitted.load(Ordering::SeqCst);
            if used >= self.max_per_window {
                return false;
            }
            if self
                .admitted
                .compare_exchange(used, used + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn has_permit(&self) -> bool {
        self.roll_window();
        self.admitted.load(Ordering::SeqCst) < self.max_per_window
    }
}

impl<Req, Resp> Backend<Req, Resp> for RateThrottle<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        if !self.try_acquire() {
            tracing::warn!(
                max_per_window = self.max_per_window,
                "rate limit reached, rejecting call"
            );
            return Ok(AsyncResult::cancelled());
        }
        Ok(match self.backend.invoke(req) {
            Ok(server) => server,
            Err(err) => AsyncResult::failed(err),
        })
    }

    fn is_healthy(&self) -> bool {
        self.has_permit() && self.backend.is_healthy()
    }
}
