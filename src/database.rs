//! Coordination store and convergence notification interfaces
//!
//! The coordination store is the durable source of the cluster topology and
//! records the last converged bundle so a new controller can pick up from
//! it. `MemoryCoordinationStore` is the in-process implementation used by
//! the simulator and tests.

use std::sync::Arc;
use parking_lot::Mutex;
use crate::cluster::ConfiguredNode;
use crate::error::{StoreError, StoreResult};
use crate::state::ClusterStateBundle;

/// Durable store the broadcaster reports convergence to
pub trait CoordinationStore {
    /// Authoritative set of configured nodes
    fn current_topology(&self) -> StoreResult<Vec<ConfiguredNode>>;

    /// Record the latest bundle acknowledged by every distributor
    fn persist_converged(&mut self, bundle: &ClusterStateBundle) -> StoreResult<()>;
}

/// Receives each newly converged bundle, exactly once per bundle
pub trait ConvergenceListener {
    fn on_bundle_converged(&mut self, bundle: &Arc<ClusterStateBundle>);
}

impl<F> ConvergenceListener for F
where
    F: FnMut(&Arc<ClusterStateBundle>),
{
    fn on_bundle_converged(&mut self, bundle: &Arc<ClusterStateBundle>) {
        self(bundle)
    }
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    topology: Vec<ConfiguredNode>,
    converged: Vec<ClusterStateBundle>,
    failing_writes: u32,
}

/// In-memory coordination store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoordinationStore {
    inner: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryCoordinationStore {
    pub fn new(topology: Vec<ConfiguredNode>) -> Self {
        let store = Self::default();
        store.set_topology(topology);
        store
    }

    pub fn set_topology(&self, topology: Vec<ConfiguredNode>) {
        self.inner.lock().topology = topology;
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().failing_writes = count;
    }

    /// Every bundle persisted so far, oldest first
    pub fn converged_bundles(&self) -> Vec<ClusterStateBundle> {
        self.inner.lock().converged.clone()
    }

    pub fn latest_converged(&self) -> Option<ClusterStateBundle> {
        self.inner.lock().converged.last().cloned()
    }
}

impl CoordinationStore for MemoryCoordinationStore {
    fn current_topology(&self) -> StoreResult<Vec<ConfiguredNode>> {
        Ok(self.inner.lock().topology.clone())
    }

    fn persist_converged(&mut self, bundle: &ClusterStateBundle) -> StoreResult<()> {
        let mut state = self.inner.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        state.converged.push(bundle.clone());
        Ok(())
    }
}
