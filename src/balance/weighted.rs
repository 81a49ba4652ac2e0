//! Weighted round-robin selection.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{invoke_captured, Backend, SharedBackend};
use crate::result::AsyncResult;
use crate::DispatchError;

struct WeightedHandle<Req, Resp> {
    backend: SharedBackend<Req, Resp>,
    weight: u32,
    attempted: AtomicU64,
}

impl<Req, Resp> WeightedHandle<Req, Resp> {
    fn new(backend: SharedBackend<Req, Resp>, weight: u32) -> Self {
        Self {
            backend,
            weight,
            attempted: AtomicU64::new(0),
        }
    }

    /// Attempted calls per unit of weight. A zero-weight handle costs
    /// infinity and is never selected.
    fn cost(&self) -> f64 {
        if self.weight == 0 {
            f64::INFINITY
        } else {
            self.attempted.load(Ordering::SeqCst) as f64 / f64::from(self.weight)
        }
    }

    fn is_healthy(&self) -> bool {
        self.weight != 0 && self.backend.is_healthy()
    }

    /// Catch-up normalization for unhealthy handles: pin the attempted
    /// count to what a healthy handle of this weight would have reached, so
    /// a backend returning to health is neither starved nor flooded.
    fn normalize(&self, min_healthy_cost: f64) {
        if self.backend.is_healthy() {
            return;
        }
        let caught_up = (min_healthy_cost * f64::from(self.weight)).floor() as u64;
        self.attempted.store(caught_up, Ordering::SeqCst);
    }
}

/// Composite backend that spreads calls proportionally to fixed weights.
///
/// Each handle tracks how many calls were attempted against it; selection
/// picks the healthy handle with the lowest `attempted / weight` cost (full
/// scan, ties broken in scan order). Keep the weight sum in the order of the
/// request volume over a tolerable interval — a very large sum delays
/// renormalization by that many requests.
pub struct WeightedRoundRobin<Req, Resp> {
    backends: Vec<WeightedHandle<Req, Resp>>,
}

impl<Req, Resp> WeightedRoundRobin<Req, Resp> {
    /// Build a weighted balancer from parallel backend and weight lists.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `backends` is empty or the two
    /// lists differ in length.
    pub fn new(
        backends: Vec<SharedBackend<Req, Resp>>,
        weights: Vec<u32>,
    ) -> Result<Self, DispatchError> {
        if backends.is_empty() {
            return Err(DispatchError::Config(
                "at least one backend must be present".to_string(),
            ));
        }
        if weights.len() != backends.len() {
            return Err(DispatchError::Config(format!(
                "{} weights for {} backends",
                weights.len(),
                backends.len()
            )));
        }
        Ok(Self {
            backends: backends
                .into_iter()
                .zip(weights)
                .map(|(backend, weight)| WeightedHandle::new(backend, weight))
                .collect(),
        })
    }

    fn select(&self) -> Option<&WeightedHandle<Req, Resp>> {
        let mut min_healthy_cost = f64::INFINITY;
        let mut winner: Option<&WeightedHandle<Req, Resp>> = None;

        // Full scan on purpose: the normalization pass below needs the
        // minimum over every healthy handle.
        for handle in &self.backends {
            let cost = handle.cost();
            if cost < min_healthy_cost && handle.is_healthy() {
                min_healthy_cost = cost;
                winner = Some(handle);
            }
        }

        if winner.is_some() {
            for handle in &self.backends {
                handle.normalize(min_healthy_cost);
            }
        }

        if let Some(handle) = winner {
            handle.attempted.fetch_add(1, Ordering::SeqCst);
        }
        winner
    }
}

impl<Req, Resp> Backend<Req, Resp> for WeightedRoundRobin<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync + 'static,
{
    fn invoke(&self, req: Req) -> Result<AsyncResult<Resp>, DispatchError> {
        Ok(match self.select() {
            Some(handle) => invoke_captured(&*handle.backend, req),
            None => {
                tracing::warn!("weighted round robin found no healthy backend");
                AsyncResult::failed(DispatchError::NoHealthyBackend)
            }
        })
    }

    fn is_healthy(&self) -> bool {
        self.backends.iter().any(WeightedHandle::is_healthy)
    }
}
