//! Round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::backend::{invoke_captured, Backend, SharedBackend};
use crate::result::AsyncResult;
use crate::DispatchError;

/// Round-robin load balancer over a fixed backend pool.
///
/// Scans from a shared rotation cursor, returns the first healthy backend,
/// and advances the cursor just past it. The cursor is a fairness hint, not
/// a correctness guarantee: when backends respond faster than requests
/// arrive, or calls race from many threads, strict round-robin order may be
/// violated. That is accepted by design.
pub struct RoundRobin<Req, Resp> {
    backends: Vec<SharedBackend<Req, Resp>>,
    rotation: AtomicUsize,
}

impl<Req, Resp> RoundRobin<Req, Resp> {
    /// Build a round-robin balancer with a random starting cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn new(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        let start = random_start(backends.len())?;
        Self::with_start(backends, start)
    }

    /// Build a round-robin balancer starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty or `start`
    /// is out of range.
    pub fn with_start(
        backends: Vec<SharedBackend<Req, Resp>>,
        start: usize,
    ) -> Result<Self, DispatchError> {
        check_start(backends.len(), start)?;
        Ok(Self {
            backends,
            rotation: AtomicUsize::new(start),
        })
    }

    fn select(&self) -> Option<&SharedBackend<Req, Resp>> {
        let size = self.backends.len();
        let start = self.rotation.load(Ordering::Relaxed);
        for i in 0..size {
            let pos = (start + i) % size;
            if self.backends[pos].is_healthy() {
                self.rotation.store((pos + 1) % size, Ordering::Relaxed);
                tracing::debug!(backend = pos, "round robin selected backend");
                return Some(&self.backends[pos]);
            }
        }
        None
    }
}

impl<Req, Resp> Backend<Req, Resp> for RoundRobin<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        Ok(match self.select() {
            Some(backend) => invoke_captured(&**backend, req),
            None => {
                tracing::warn!("round robin found no healthy backend");
                AsyncResult::failed(DispatchError::NoHealthyBackend)
            }
        })
    }

    fn is_healthy(&self) -> bool {
        self.backends.iter().any(|backend| backend.is_healthy())
    }
}

/// Pick a random starting cursor for a pool of `size` backends.
pub(crate) fn random_start(size: usize) -> Result<usize, DispatchError> {
    if size == 0 {
        return Err(DispatchError::Config(
            "at least one backend must be present".to_string(),
        ));
    }
    Ok(rand::thread_rng().gen_range(0..size))
}

/// Validate an explicit starting cursor against the pool size.
pub(crate) fn check_start(size: usize, start: usize) -> Result<(), DispatchError> {
    if size == 0 {
        return Err(DispatchError::Config(
            "at least one backend must be present".to_string(),
        ));
    }
    if start >= size {
        return Err(DispatchError::Config(format!(
            "starting cursor {start} out of range for {size} backends"
        )));
    }
    Ok(())
}
