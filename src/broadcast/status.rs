//! Read-only broadcast status for callers outside the control loop

use std::sync::Arc;
use parking_lot::RwLock;
use crate::broadcast::BroadcastPhase;
use crate::state::ClusterStateBundle;

/// Snapshot of broadcaster progress
#[derive(Debug, Clone, Default)]
pub struct BroadcastStatus {
    pub phase: BroadcastPhase,
    pub current_bundle: Option<Arc<ClusterStateBundle>>,
    pub last_converged: Option<Arc<ClusterStateBundle>>,
    /// Required distributors that have not acked the current state
    pub pending_state_acks: usize,
    /// Required distributors that have not acked the current activation
    pub pending_activation_acks: usize,
}

/// Cloneable handle to the latest published status. Reads copy the
/// snapshot and never wait on the control loop for longer than the copy.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStatusHandle {
    inner: Arc<RwLock<BroadcastStatus>>,
}

impl BroadcastStatusHandle {
    pub fn snapshot(&self) -> BroadcastStatus {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> BroadcastPhase {
        self.inner.read().phase
    }

    pub fn current_bundle(&self) -> Option<Arc<ClusterStateBundle>> {
        self.inner.read().current_bundle.clone()
    }

    pub fn last_converged(&self) -> Option<Arc<ClusterStateBundle>> {
        self.inner.read().last_converged.clone()
    }

    pub(crate) fn publish(&self, status: BroadcastStatus) {
        *self.inner.write() = status;
    }
}
