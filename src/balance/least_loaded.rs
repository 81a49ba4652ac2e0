//! Least-loaded selection with linked caller/backend results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{invoke_captured, Backend, SharedBackend};
use crate::balance::round_robin::{check_start, random_start};
use crate::result::{link, AsyncResult};
use crate::DispatchError;

/// One pooled backend plus its outstanding-call counter.
///
/// The counter is incremented exactly once at dispatch and decremented
/// exactly once when the linked result turns terminal, so it always equals
/// the number of in-flight calls routed through this handle.
struct BackendHandle<Req, Resp> {
    backend: SharedBackend<Req, Resp>,
    outstanding: Arc<AtomicUsize>,
}

impl<Req, Resp> BackendHandle<Req, Resp>
where
    Resp: Clone + Send + 'static,
{
    fn new(backend: SharedBackend<Req, Resp>) -> Self {
        Self {
            backend,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call(&self, req: Req) -> AsyncResult<Resp> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let server = invoke_captured(&*self.backend, req);
        let client = AsyncResult::pending();

        let outstanding = Arc::clone(&self.outstanding);
        link(&server, &client, move || {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        });

        client
    }
}

/// Composite backend that forwards each call to the least-loaded member.
///
/// When all backends are equally loaded the behaviour degenerates to round
/// robin: ties break in scan order from the rotation cursor, and the cursor
/// advances past each winner. Note the usual caveat: if a bad backend
/// answers much faster than good ones it will look underloaded and attract
/// more traffic, so pair this with prompt health reporting.
pub struct LeastLoaded<Req, Resp> {
    backends: Vec<BackendHandle<Req, Resp>>,
    rotation: AtomicUsize,
}

impl<Req, Resp> LeastLoaded<Req, Resp>
where
    Resp: Clone + Send + 'static,
{
    /// Build a least-loaded balancer with a random starting cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty.
    pub fn new(backends: Vec<SharedBackend<Req, Resp>>) -> Result<Self, DispatchError> {
        let start = random_start(backends.len())?;
        Self::with_start(backends, start)
    }

    /// Build a least-loaded balancer starting at `start`.
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
            backends: backends.into_iter().map(BackendHandle::new).collect(),
            rotation: AtomicUsize::new(start),
        })
    }

    fn select(&self) -> Option<&BackendHandle<Req, Resp>> {
        let size = self.backends.len();
        let start = self.rotation.load(Ordering::Relaxed);

        let mut min_cost = usize::MAX;
        let mut winner: Option<&BackendHandle<Req, Resp>> = None;
        let mut next_cursor = start;

        for i in 0..size {
            let pos = (start + i) % size;
            let handle = &self.backends[pos];
            if handle.backend.is_healthy() {
                let cost = handle.outstanding.load(Ordering::SeqCst);
                if cost < min_cost {
                    min_cost = cost;
                    winner = Some(handle);
                    next_cursor = (pos + 1) % size;
                }
            }
        }

        self.rotation.store(next_cursor, Ordering::Relaxed);
        winner
    }
}

impl<Req, Resp> Backend<Req, Resp> for LeastLoaded<Req, Resp>
where
    Req: Send + Sync,
    Resp: Clone + Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        Ok(match self.select() {
            Some(handle) => handle.call(req),
            None => {
                tracing::warn!("least loaded found no healthy backend");
                AsyncResult::failed(DispatchError::NoHealthyBackend)
            }
        })
    }

    fn is_healthy(&self) -> bool {
        self.backends
            .iter()
            .any(|handle| handle.backend.is_healthy())
    }
}
