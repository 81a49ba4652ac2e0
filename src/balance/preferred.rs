//! Strict-priority failover.

use crate::backend::{invoke_captured, Backend, SharedBackend};
use crate::result::AsyncResult;
use crate::DispatchError;

/// Forwards every call to the first healthy backend in priority order.
///
/// No load balancing and no retry: only the upfront health snapshot gates
/// selection. If the chosen backend's call later fails or is cancelled, that
/// outcome is surfaced to the caller unmodified rather than retried against
/// the next backend in line.
pub struct Preferred<Req, Resp> {
    backends: Vec<SharedBackend<Req, Resp>>,
}

impl<Req, Resp> Preferred<Req, Resp> {
    /// Build a failover chain from `backends`, most preferred first.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn new(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        if backends.is_empty() {
            return Err(DispatchError::Config(
                "at least one backend must be present".to_string(),
            ));
        }
        Ok(Self { backends })
    }
}

impl<Req, Resp> Backend<Req, Resp> for Preferred<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        for (priority, backend) in self.backends.iter().enumerate() {
            if backend.is_healthy() {
                tracing::debug!(priority, "preferred selected backend");
                return Ok(invoke_captured(&**backend, req));
            }
        }
        tracing::warn!("preferred found no healthy backend");
        Ok(AsyncResult::failed(DispatchError::NoHealthyBackend))
    }

    fn is_healthy(&self) -> bool {
        self.backends.iter().any(|backend| backend.is_healthy())
    }
}
