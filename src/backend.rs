//! The abstract backend contract and its ready-made implementations.
//!
//! A [`Backend`] is anything that can be invoked with a request to yield a
//! pending [`AsyncResult`] and can report a point-in-time health snapshot.
//! Strategies and gates consume and implement the same trait, so composites
//! nest arbitrarily: a gate can wrap a strategy wrapping gates wrapping raw
//! backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::result::AsyncResult;
use crate::DispatchError;

/// An invokable remote endpoint with a health snapshot.
///
/// Implementations must be thread-safe (`Send + Sync`); the trait is
/// object-safe so pools are held as `Arc<dyn Backend<Req, Resp>>`.
pub trait Backend<Req, Resp>: Send + Sync {
    /// Dispatch a request, returning promptly with a pending-or-terminal
    /// result.
    ///
    /// # Errors
    ///
    /// A synchronous `Err` models a fault raised before any call was put in
    /// flight. Composites never surface it to their callers: every call site
    /// routes through [`invoke_captured`], which converts the fault into an
    /// immediately-failed result.
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError>;

    /// A cheap, side-effect-free, uncached health snapshot.
    ///
    /// Strategies query this fresh on every selection and never memoize it;
    /// caching, if wanted, is the backend implementation's job.
    fn is_healthy(&self) -> bool;
}

/// A shared, dynamically-dispatched backend.
pub type SharedBackend<Req, Resp> = Arc<dyn Backend<Req, Resp>>;

/// Invoke `backend`, converting a synchronous fault into a failed result.
pub fn invoke_captured<Req, Resp>(backend: &dyn Backend<Req, Resp>, req: Req) -> AsyncResult<Resp>
where
    Resp: Send + 'static,
{
    match backend.invoke(req) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, "backend raised synchronously");
            AsyncResult::failed(err)
        }
    }
}

/// Closure-based [`Backend`], handy for tests and adapters.
///
/// # Example
///
/// ```
/// use tokio_backend_dispatch::{AsyncResult, Backend, FnBackend};
///
/// let echo = FnBackend::new(
///     |req: String| AsyncResult::completed(req.to_uppercase()),
///     || true,
/// );
/// assert!(echo.is_healthy());
/// ```
pub struct FnBackend<F, H> {
    invoke_fn: F,
    health_fn: H,
}

impl<F, H> FnBackend<F, H> {
    /// Build a backend from an invoke closure and a health closure.
    pub fn new(invoke_fn: F, health_fn: H) -> Self {
        Self {
            invoke_fn,
            health_fn,
        }
    }
}

impl<Req, Resp, F, H> Backend<Req, Resp> for FnBackend<F, H>
where
    F: Fn(Req) -> AsyncResult<Resp> + Send + Sync,
    H: Fn() -> bool + Send + Sync,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        Ok((self.invoke_fn)(req))
    }

    fn is_healthy(&self) -> bool {
        (self.health_fn)()
    }
}

/// Bridges an async handler onto an explicitly injected Tokio runtime.
///
/// Each invoke spawns the handler on the given [`Handle`] and returns a
/// pending cell that the spawned task completes. If the caller cancels the
/// cell first, the in-flight task is aborted. The scheduling context is a
/// constructor argument on purpose — nothing in this crate assumes a
/// process-wide default runtime.
pub struct TaskBackend<F> {
    handle: Handle,
    handler: F,
    healthy: Arc<AtomicBool>,
}

impl<F> TaskBackend<F> {
    /// Build a backend that runs `handler` on `handle` for every request.
    pub fn new(handle: Handle, handler: F) -> Self {
        Self {
            handle,
            handler,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share the health flag with an external health checker.
    pub fn health_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }

    /// Flip the health snapshot reported by [`Backend::is_healthy`].
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

impl<Req, Resp, F, Fut> Backend<Req, Resp> for TaskBackend<F>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Resp, DispatchError>> + Send + 'static,
    Resp: Clone + Send + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        let result = AsyncResult::pending();
        let fut = (self.handler)(req);

        let settle = result.clone();
        let join = self.handle.spawn(async move {
            match fut.await {
                Ok(value) => {
                    settle.complete(value);
                }
                Err(err) => {
                    settle.fail(err);
                }
            }
        });

        let watched = result.clone();
        result.on_done(move || {
            if watched.is_cancelled() {
                join.abort();
            }
        });

        Ok(result)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fn_backend_reports_health_fresh() {
        let healthy = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&healthy);
        let backend = FnBackend::new(
            |req: u32| AsyncResult::completed(req + 1),
            move || flag.load(Ordering::SeqCst),
        );

        assert!(backend.is_healthy());
        healthy.store(false, Ordering::SeqCst);
        assert!(!backend.is_healthy());
    }

    #[tokio::test]
    async fn test_invoke_captured_converts_sync_fault() {
        struct Faulty;
        impl Backend<u32, u32> for Faulty {
            fn invoke(&self, _req: u32) -> Result<AsyncResult<u32>, DispatchError> {
                Err(DispatchError::Backend("refused".to_string()))
            }
            fn is_healthy(&self) -> bool {
                true
            }
        }

        let result = invoke_captured(&Faulty, 1);
        assert!(matches!(
            result.wait().await,
            Err(DispatchError::Backend(msg)) if msg == "refused"
        ));
    }

    #[tokio::test]
    async fn test_task_backend_completes_from_spawned_task() {
        let backend = TaskBackend::new(Handle::current(), |req: u32| async move { Ok(req * 2) });
        let result = invoke_captured(&backend, 21);
        assert_eq!(result.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_task_backend_cancellation_aborts_task() {
        let backend = TaskBackend::new(Handle::current(), |_req: u32| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0u32)
        });

        let result = invoke_captured(&backend, 1);
        assert!(result.is_pending());
        result.cancel();
        assert!(matches!(result.wait().await, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_task_backend_health_flag_round_trip() {
        let backend = TaskBackend::new(Handle::current(), |req: u32| async move { Ok(req) });
        assert!(Backend::<u32, u32>::is_healthy(&backend));
        backend.set_healthy(false);
        assert!(!Backend::<u32, u32>::is_healthy(&backend));
        backend.health_flag().store(true, Ordering::Relaxed);
        assert!(Backend::<u32, u32>::is_healthy(&backend));
    }
}
