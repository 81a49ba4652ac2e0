//! Single-assignment asynchronous result cells and result linking.
//!
//! [`AsyncResult`] is the pending-call handle every backend and strategy in
//! this crate trades in: a cell that starts `Pending`, transitions exactly
//! once to `Completed`, `Failed`, or `Cancelled`, and invokes registered
//! listeners after the terminal transition. [`link`] binds a backend-facing
//! cell to a caller-facing cell so completion flows downstream and
//! cancellation flows in both directions, with per-listener idempotence
//! supplied by [`IdempotentAction`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::DispatchError;

/// Terminal state of an [`AsyncResult`].
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The call produced a response.
    Completed(T),
    /// The call failed with an error.
    Failed(DispatchError),
    /// The call was cancelled before completing.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Convert into the caller-visible `Result`, mapping cancellation to
    /// [`DispatchError::Cancelled`].
    pub fn into_result(self) -> Result<T, DispatchError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(err) => Err(err),
            Outcome::Cancelled => Err(DispatchError::Cancelled),
        }
    }
}

type Listener = Box<dyn FnOnce() + Send>;

struct Slot<T> {
    outcome: Option<Outcome<T>>,
    listeners: Vec<Listener>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

/// A cheaply-cloneable handle to a single-assignment asynchronous result.
///
/// Once the cell leaves `Pending` it is immutable; later `complete`, `fail`,
/// and `cancel` calls are no-ops. Listeners registered with
/// [`on_done`](Self::on_done) run at most once, after the terminal
/// transition, outside the internal lock — a listener may safely transition
/// other cells (including this one's link partner).
pub struct AsyncResult<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<T: Send + 'static> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T: Send + 'static> AsyncResult<T> {
    /// Create a new `Pending` result.
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    outcome: None,
                    listeners: Vec::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Create an already-completed result.
    pub fn completed(value: T) -> Self {
        let result = Self::pending();
        result.complete(value);
        result
    }

    /// Create an already-failed result.
    pub fn failed(err: DispatchError) -> Self {
        let result = Self::pending();
        result.fail(err);
        result
    }

    /// Create an already-cancelled result.
    pub fn cancelled() -> Self {
        let result = Self::pending();
        result.cancel();
        result
    }

    /// Attempt the `Pending → Completed` transition.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// cell was already terminal.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Outcome::Completed(value))
    }

    /// Attempt the `Pending → Failed` transition.
    pub fn fail(&self, err: DispatchError) -> bool {
        self.settle(Outcome::Failed(err))
    }

    /// Attempt the `Pending → Cancelled` transition.
    ///
    /// Cancellation of a linked caller-facing cell propagates upstream
    /// through the listener installed by [`link`].
    pub fn cancel(&self) -> bool {
        self.settle(Outcome::Cancelled)
    }

    /// Register a listener to run once the cell is terminal.
    ///
    /// Runs `f` immediately (on the calling thread) if the cell is already
    /// terminal, otherwise on whichever thread performs the terminal
    /// transition.
    pub fn on_done(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut slot = self.lock_slot();
            if slot.outcome.is_none() {
                slot.listeners.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// `true` while the cell has not reached a terminal state.
    pub fn is_pending(&self) -> bool {
        self.lock_slot().outcome.is_none()
    }

    /// `true` once the cell has reached any terminal state.
    pub fn is_done(&self) -> bool {
        !self.is_pending()
    }

    /// `true` if the cell terminated by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.lock_slot().outcome, Some(Outcome::Cancelled))
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let listeners = {
            let mut slot = self.lock_slot();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.listeners)
        };
        self.shared.notify.notify_waiters();
        for listener in listeners {
            listener();
        }
        true
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot<T>> {
        // A listener panic while holding no lock cannot poison the slot;
        // recover from poisoning rather than propagate it.
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> AsyncResult<T> {
    /// Snapshot the terminal outcome, or `None` while still pending.
    pub fn try_outcome(&self) -> Option<Outcome<T>> {
        self.lock_slot().outcome.clone()
    }

    /// Wait until the cell is terminal and yield the value, the failure, or
    /// [`DispatchError::Cancelled`].
    pub async fn wait(&self) -> Result<T, DispatchError> {
        loop {
            // Register with the notifier before checking state so a
            // transition between the check and the await cannot be missed.
            let mut notified = std::pin::pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            if let Some(outcome) = self.try_outcome() {
                return outcome.into_result();
            }
            notified.await;
        }
    }
}

/// A zero-argument action that runs at most once no matter how many times,
/// or from how many threads, it is triggered.
///
/// The guard wraps the action, not the registration: two listeners racing to
/// observe the same terminal transition both call [`run`](Self::run), but
/// only the compare-exchange winner executes the wrapped closure.
pub struct IdempotentAction {
    fired: AtomicBool,
    action: Mutex<Option<Listener>>,
}

impl IdempotentAction {
    /// Wrap `action` in a shareable single-fire guard.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            fired: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        })
    }

    /// Execute the wrapped action if no prior call has.
    pub fn run(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let action = self
                .action
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(action) = action {
                action();
            }
        }
    }

    /// `true` once some call to [`run`](Self::run) has claimed the action.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for IdempotentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotentAction")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Bind a backend-facing cell to a caller-facing cell.
///
/// - When `server` turns terminal: cancellation cancels `client`, success and
///   failure propagate to `client`, and `on_settled` (counter bookkeeping)
///   runs exactly once regardless of which branch fired.
/// - When `client` is cancelled: the cancellation is propagated upstream to
///   `server`, so an abandoned caller releases the in-flight backend call.
///
/// Whichever side reaches a terminal state first wins; the loser's
/// transition is a no-op.
pub fn link<T>(
    server: &AsyncResult<T>,
    client: &AsyncResult<T>,
    on_settled: impl FnOnce() + Send + 'static,
) where
    T: Clone + Send + 'static,
{
    let downstream = IdempotentAction::new({
        let server = server.clone();
        let client = client.clone();
        move || {
            match server.try_outcome() {
                Some(Outcome::Cancelled) => {
                    client.cancel();
                }
                Some(Outcome::Completed(value)) => {
                    client.complete(value);
                }
                Some(Outcome::Failed(err)) => {
                    client.fail(err);
                }
                // Listeners only fire post-terminal; nothing to propagate.
                None => {}
            }
            on_settled();
        }
    });
    server.on_done(move || downstream.run());

    let upstream = IdempotentAction::new({
        let server = server.clone();
        let client = client.clone();
        move || {
            if client.is_cancelled() {
                server.cancel();
            }
        }
    });
    client.on_done(move || upstream.run());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_complete_is_single_assignment() {
        let result = AsyncResult::pending();
        assert!(result.complete(1));
        assert!(!result.complete(2));
        assert!(!result.fail(DispatchError::NoHealthyBackend));
        assert!(!result.cancel());

        match result.try_outcome() {
            Some(Outcome::Completed(v)) => assert_eq!(v, 1),
            other => panic!("expected Completed(1), got {other:?}"),
        }
    }

    #[test]
    fn test_listener_runs_immediately_when_terminal() {
        let result = AsyncResult::completed(7);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        result.on_done(move || flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_listener_runs_on_transition() {
        let result: AsyncResult<u32> = AsyncResult::pending();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        result.on_done(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        result.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(result.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_yields_value() {
        let result = AsyncResult::pending();
        let waiter = result.clone();
        let task = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        result.complete("done");

        let value = task.await.unwrap_or_else(|_| panic!("join failed"));
        assert_eq!(value, Ok("done"));
    }

    #[tokio::test]
    async fn test_wait_surfaces_cancellation_as_error() {
        let result: AsyncResult<u32> = AsyncResult::cancelled();
        assert!(matches!(result.wait().await, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_surfaces_failure() {
        let result: AsyncResult<u32> =
            AsyncResult::failed(DispatchError::Backend("boom".to_string()));
        assert!(matches!(
            result.wait().await,
            Err(DispatchError::Backend(msg)) if msg == "boom"
        ));
    }

    #[test]
    fn test_idempotent_action_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let action = IdempotentAction::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        action.run();
        action.run();
        action.run();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(action.has_fired());
    }

    #[test]
    fn test_idempotent_action_fires_once_across_threads() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let action = IdempotentAction::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let action = Arc::clone(&action);
                std::thread::spawn(move || action.run())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap_or_else(|_| panic!("thread panicked"));
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_racing_terminal_transitions_settle_once() {
        for _ in 0..50 {
            let result: AsyncResult<u32> = AsyncResult::pending();
            let listener_runs = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&listener_runs);
            result.on_done(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let complete = {
                let r = result.clone();
                std::thread::spawn(move || r.complete(1))
            };
            let cancel = {
                let r = result.clone();
                std::thread::spawn(move || r.cancel())
            };
            let fail = {
                let r = result.clone();
                std::thread::spawn(move || r.fail(DispatchError::NoHealthyBackend))
            };

            let wins = [complete, cancel, fail]
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| panic!("thread panicked")))
                .filter(|won| *won)
                .count();

            assert_eq!(wins, 1, "exactly one transition must win the race");
            assert_eq!(listener_runs.load(Ordering::SeqCst), 1);
            assert!(result.is_done());
        }
    }

    #[test]
    fn test_link_propagates_completion_and_runs_finalizer_once() {
        let server = AsyncResult::pending();
        let client = AsyncResult::pending();
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&settled);
        link(&server, &client, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        server.complete(42);

        match client.try_outcome() {
            Some(Outcome::Completed(v)) => assert_eq!(v, 42),
            other => panic!("expected Completed(42), got {other:?}"),
        }
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_propagates_failure() {
        let server: AsyncResult<u32> = AsyncResult::pending();
        let client = AsyncResult::pending();
        link(&server, &client, || {});

        server.fail(DispatchError::Backend("downstream".to_string()));
        assert!(matches!(
            client.try_outcome(),
            Some(Outcome::Failed(DispatchError::Backend(_)))
        ));
    }

    #[test]
    fn test_link_server_cancel_reaches_client() {
        let server: AsyncResult<u32> = AsyncResult::pending();
        let client = AsyncResult::pending();
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&settled);
        link(&server, &client, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        server.cancel();

        assert!(client.is_cancelled());
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_client_cancel_reaches_server() {
        let server: AsyncResult<u32> = AsyncResult::pending();
        let client = AsyncResult::pending();
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&settled);
        link(&server, &client, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.cancel();

        // Upstream cancel loops back through the server listener; the
        // finalizer must still run exactly once.
        assert!(server.is_cancelled());
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_completion_beats_late_cancel() {
        let server = AsyncResult::pending();
        let client = AsyncResult::pending();
        link(&server, &client, || {});

        server.complete(9);
        client.cancel();

        match client.try_outcome() {
            Some(Outcome::Completed(v)) => assert_eq!(v, 9),
            other => panic!("completion must win, got {other:?}"),
        }
        assert!(!server.is_cancelled());
    }
}
