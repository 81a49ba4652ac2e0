//! Concurrency-limiting admission gate.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::backend::{Backend, SharedBackend};
use crate::result::AsyncResult;
use crate::DispatchError;

/// Caps the number of concurrent in-flight calls to one backend.
///
/// Admission is a non-blocking permit acquire: when no permit is free the
/// call is rejected with an immediately-cancelled result instead of being
/// queued. The permit is returned when the forwarded call reaches any
/// terminal state.
pub struct ConcurrencyThrottle<Req, Resp> {
    semaphore: Arc<Semaphore>,
    backend: SharedBackend<Req, Resp>,
}

impl<Req, Resp> ConcurrencyThrottle<Req, Resp> {
    /// Wrap `backend` with a pool of `permits` concurrent-call permits.
    pub fn new(backend: SharedBackend<Req, Resp>, permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            backend,
        }
    }

    /// Number of permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl<Req, Resp> Backend<Req, Resp> for ConcurrencyThrottle<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("concurrency limit reached, rejecting call");
                return Ok(AsyncResult::cancelled());
            }
        };

        match self.backend.invoke(req) {
            Ok(server) => {
                server.on_done(move || drop(permit));
                Ok(server)
            }
            Err(err) => {
                // The permit is released here by drop.
                Ok(AsyncResult::failed(err))
            }
        }
    }

    /// Best-effort snapshot: a permit may be taken between this check and a
    /// subsequent call.
    fn is_healthy(&self) -> bool {
        self.semaphore.available_permits() > 0 && self.backend.is_healthy()
    }
}
