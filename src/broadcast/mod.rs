//! Cluster state broadcasting
//!
//! `SystemStateBroadcaster` publishes the current cluster state bundle to
//! every node, tracks acknowledgements, and decides when the bundle has
//! converged. Bundles with deferred activation go through a second round:
//! once every required distributor has stored the bundle, all nodes are
//! told to activate it, and the bundle converges when every required
//! distributor has acked the activation.
//!
//! All methods are called from the control loop, once per tick, in the
//! order: `handle_new_cluster_states`, `broadcast_new_state_bundle_if_required`,
//! `process_responses`, `check_if_cluster_state_is_acked_by_all_distributors`,
//! `broadcast_state_activations_if_required`. Replies arrive on transport
//! threads and are only queued; they take effect in `process_responses`.

pub mod reply_queue;
pub mod status;

pub use reply_queue::{
    ActivateClusterStateVersionRequest, CompletedRequest, ReplyQueue, SetClusterStateRequest,
};
pub use status::{BroadcastStatus, BroadcastStatusHandle};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use crate::cluster::{ContentCluster, NodeInfo, ReplyDisposition};
use crate::communicator::{ActivationWaiter, Communicator, StateWaiter};
use crate::config::BroadcasterConfig;
use crate::database::{ConvergenceListener, CoordinationStore};
use crate::error::{BroadcastError, BroadcastResult, RequestFailure};
use crate::state::ClusterStateBundle;
use crate::timer::Timer;
use crate::types::Node;

/// Progress of the current bundle through the distribution protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPhase {
    /// No bundle has been handed in
    #[default]
    Idle,
    /// Bundle received, not yet sent
    Pending,
    /// Waiting for required distributors to store the bundle
    AwaitingStateAcks,
    /// Waiting for required distributors to activate the bundle
    AwaitingActivationAcks,
    Converged,
}

impl fmt::Display for BroadcastPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BroadcastPhase::Idle => "idle",
            BroadcastPhase::Pending => "pending",
            BroadcastPhase::AwaitingStateAcks => "awaiting-state-acks",
            BroadcastPhase::AwaitingActivationAcks => "awaiting-activation-acks",
            BroadcastPhase::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// Outcome counts of one `process_responses` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplySummary {
    pub acked: usize,
    pub failed: usize,
    pub discarded: usize,
}

/// Distributes cluster state bundles and tracks their convergence
pub struct SystemStateBroadcaster {
    timer: Arc<dyn Timer>,
    config: BroadcasterConfig,
    replies: ReplyQueue,
    current_bundle: Option<Arc<ClusterStateBundle>>,
    last_converged: Option<Arc<ClusterStateBundle>>,
    phase: BroadcastPhase,
    last_error_log_ms: HashMap<Node, u64>,
    status: BroadcastStatusHandle,
}

impl SystemStateBroadcaster {
    pub fn new(timer: Arc<dyn Timer>, config: BroadcasterConfig) -> Self {
        Self {
            timer,
            config,
            replies: ReplyQueue::new(),
            current_bundle: None,
            last_converged: None,
            phase: BroadcastPhase::Idle,
            last_error_log_ms: HashMap::new(),
            status: BroadcastStatusHandle::default(),
        }
    }

    pub fn phase(&self) -> BroadcastPhase {
        self.phase
    }

    pub fn current_bundle(&self) -> Option<&Arc<ClusterStateBundle>> {
        self.current_bundle.as_ref()
    }

    /// Last bundle that completed every required acknowledgement round
    pub fn get_last_cluster_state_bundle_converged(&self) -> Option<Arc<ClusterStateBundle>> {
        self.last_converged.clone()
    }

    /// Handle for reading status from other threads
    pub fn status_handle(&self) -> BroadcastStatusHandle {
        self.status.clone()
    }

    /// Replace the bundle being distributed. Nothing is sent until the next
    /// broadcast; replies still in flight for older versions are ignored.
    pub fn handle_new_cluster_states(&mut self, bundle: impl Into<Arc<ClusterStateBundle>>) {
        let bundle = bundle.into();
        if let Some(current) = &self.current_bundle {
            if **current == *bundle {
                trace!(version = bundle.version(), "Bundle unchanged, keeping progress");
                return;
            }
            if current.version() == bundle.version() {
                warn!(version = bundle.version(), "New bundle reuses the version of the current bundle");
            }
        }

        if self
            .last_converged
            .as_ref()
            .is_some_and(|converged| converged.version() != bundle.version())
        {
            self.last_converged = None;
        }
        debug!(
            version = bundle.version(),
            deferred_activation = bundle.deferred_activation(),
            "Received new cluster state bundle"
        );
        self.current_bundle = Some(bundle);
        self.phase = BroadcastPhase::Pending;
        self.publish_status(None);
    }

    /// Send the current bundle to every reachable node that has neither
    /// acked it nor has a request for it outstanding. Returns the number of
    /// requests issued.
    pub fn broadcast_new_state_bundle_if_required<C>(&mut self, cluster: &mut ContentCluster, communicator: &C) -> usize
    where
        C: Communicator + ?Sized,
    {
        let Some(bundle) = self.current_bundle.clone() else {
            return 0;
        };
        let version = bundle.version();
        let storage_timestamps: Vec<(u16, u64)> = cluster
            .storage_nodes()
            .filter(|info| info.start_timestamp() != 0)
            .map(|info| (info.node().index, info.start_timestamp()))
            .collect();

        let mut sent = 0;
        for info in cluster.node_infos_mut() {
            if !info.needs_state_bundle(version) {
                continue;
            }
            if info.rpc_address().is_none() {
                trace!(node = %info.node(), "No RPC address, not sending cluster state");
                continue;
            }

            let (node_bundle, injected) = bundle_for_node(&bundle, info, &storage_timestamps);
            if !injected.is_empty() {
                debug!(
                    node = %info.node(),
                    version,
                    timestamps = injected.len(),
                    "Including unobserved startup timestamps in bundle"
                );
            }
            info.record_state_bundle_sent(version, injected);
            debug!(node = %info.node(), version, "Sending cluster state bundle");
            let waiter = StateWaiter::new(info.node(), version, self.replies.clone());
            communicator.set_system_state(node_bundle, info, waiter);
            sent += 1;
        }

        if self.phase == BroadcastPhase::Pending {
            self.phase = BroadcastPhase::AwaitingStateAcks;
            self.publish_status(None);
        }
        sent
    }

    /// Apply every reply queued since the last call
    pub fn process_responses(&mut self, cluster: &mut ContentCluster) -> ReplySummary {
        let mut summary = ReplySummary::default();
        for completed in self.replies.drain() {
            let node = completed.node();
            let Some(info) = cluster.node_info_mut(node) else {
                debug!(node = %node, "Discarding reply from node no longer in the cluster");
                summary.discarded += 1;
                continue;
            };

            let (disposition, failure) = match completed {
                CompletedRequest::SetState(req) => {
                    let failure = req.result.err();
                    (info.handle_state_reply(req.version, failure.is_none()), failure)
                }
                CompletedRequest::Activation(req) => handle_activation_reply(info, req),
            };

            match disposition {
                ReplyDisposition::Acked => {
                    trace!(node = %node, "Node acknowledged request");
                    summary.acked += 1;
                }
                ReplyDisposition::Failed => {
                    if let Some(failure) = failure {
                        self.log_request_failure(node, &failure);
                    }
                    summary.failed += 1;
                }
                ReplyDisposition::Stale => {
                    trace!(node = %node, "Discarding reply for superseded version");
                    summary.discarded += 1;
                }
            }
        }
        self.last_error_log_ms.retain(|node, _| cluster.node_info(*node).is_some());
        summary
    }

    /// Advance the protocol once every required distributor has acked the
    /// current round. Returns `Ok(true)` on the call where the current bundle
    /// converges. A persistence failure leaves the bundle unconverged; the
    /// next call retries.
    pub fn check_if_cluster_state_is_acked_by_all_distributors<S, L>(
        &mut self,
        store: &mut S,
        cluster: &ContentCluster,
        listener: &mut L,
    ) -> BroadcastResult<bool>
    where
        S: CoordinationStore + ?Sized,
        L: ConvergenceListener + ?Sized,
    {
        let Some(bundle) = self.current_bundle.clone() else {
            return Ok(false);
        };
        let version = bundle.version();

        match self.phase {
            BroadcastPhase::AwaitingStateAcks => {
                if !all_required_distributors(cluster, &bundle, |info| info.bundle_version_acked() == Some(version)) {
                    return Ok(false);
                }
                if bundle.deferred_activation() {
                    info!(version, "All distributors acked cluster state, activating");
                    self.phase = BroadcastPhase::AwaitingActivationAcks;
                    self.publish_status(Some(cluster));
                    return Ok(false);
                }
            }
            BroadcastPhase::AwaitingActivationAcks => {
                if !all_required_distributors(cluster, &bundle, |info| {
                    info.bundle_version_acked() == Some(version) && info.activation_version_acked() == Some(version)
                }) {
                    return Ok(false);
                }
            }
            BroadcastPhase::Idle | BroadcastPhase::Pending | BroadcastPhase::Converged => return Ok(false),
        }

        if let Err(source) = store.persist_converged(&bundle) {
            warn!(version, error = %source, "Failed to persist converged cluster state bundle");
            return Err(BroadcastError::Persistence { version, source });
        }
        info!(version, "Cluster state bundle converged");
        self.last_converged = Some(Arc::clone(&bundle));
        self.phase = BroadcastPhase::Converged;
        self.publish_status(Some(cluster));
        listener.on_bundle_converged(&bundle);
        Ok(true)
    }

    /// Tell every reachable node to activate the current bundle, once all
    /// required distributors have stored it. A distributor is only sent the
    /// activation after it has acked the bundle itself. Returns the number
    /// of requests issued.
    pub fn broadcast_state_activations_if_required<C>(&mut self, cluster: &mut ContentCluster, communicator: &C) -> usize
    where
        C: Communicator + ?Sized,
    {
        if self.phase != BroadcastPhase::AwaitingActivationAcks {
            return 0;
        }
        let Some(version) = self.current_bundle.as_ref().map(|bundle| bundle.version()) else {
            return 0;
        };

        let mut sent = 0;
        for info in cluster.node_infos_mut() {
            if !info.needs_activation(version) || info.rpc_address().is_none() {
                continue;
            }
            if info.is_distributor() && info.bundle_version_acked() != Some(version) {
                trace!(node = %info.node(), version, "Distributor has not stored bundle, holding activation");
                continue;
            }
            info.record_activation_sent(version);
            debug!(node = %info.node(), version, "Sending cluster state activation");
            let waiter = ActivationWaiter::new(info.node(), version, self.replies.clone());
            communicator.activate_cluster_state_version(version, info, waiter);
            sent += 1;
        }
        sent
    }

    /// Publish bundle, phase and (given a cluster) pending ack counts to
    /// the status handle
    pub fn publish_status(&self, cluster: Option<&ContentCluster>) {
        let mut status = BroadcastStatus {
            phase: self.phase,
            current_bundle: self.current_bundle.clone(),
            last_converged: self.last_converged.clone(),
            ..BroadcastStatus::default()
        };
        if let (Some(cluster), Some(bundle)) = (cluster, &self.current_bundle) {
            let version = Some(bundle.version());
            for info in required_distributors(cluster, bundle) {
                if info.bundle_version_acked() != version {
                    status.pending_state_acks += 1;
                }
                if bundle.deferred_activation() && info.activation_version_acked() != version {
                    status.pending_activation_acks += 1;
                }
            }
        }
        self.status.publish(status);
    }

    fn log_request_failure(&mut self, node: Node, failure: &RequestFailure) {
        let now = self.timer.current_time_ms();
        let due = match self.last_error_log_ms.get(&node) {
            Some(&last) => now.saturating_sub(last) >= self.config.min_time_between_node_error_logging_ms,
            None => true,
        };
        if due {
            warn!(node = %node, error = %failure, "Cluster state request failed, will retry");
            self.last_error_log_ms.insert(node, now);
        } else {
            debug!(node = %node, error = %failure, "Cluster state request failed, will retry");
        }
    }
}

/// The bundle to send to one node together with the storage startup
/// timestamps injected into it. Nodes needing no timestamps share the
/// original bundle.
fn bundle_for_node(
    bundle: &Arc<ClusterStateBundle>,
    info: &NodeInfo,
    storage_timestamps: &[(u16, u64)],
) -> (Arc<ClusterStateBundle>, BTreeMap<u16, u64>) {
    let injected: BTreeMap<u16, u64> = storage_timestamps
        .iter()
        .filter(|&&(index, timestamp)| info.needs_startup_timestamp(index, timestamp))
        .copied()
        .collect();
    if injected.is_empty() {
        (Arc::clone(bundle), injected)
    } else {
        (Arc::new(bundle.clone_with_startup_timestamps(&injected)), injected)
    }
}

fn handle_activation_reply(
    info: &mut NodeInfo,
    req: ActivateClusterStateVersionRequest,
) -> (ReplyDisposition, Option<RequestFailure>) {
    match req.result {
        Ok(actual) if actual == req.version => (info.handle_activation_reply(req.version, true), None),
        Ok(actual) => {
            warn!(
                node = %req.node,
                expected = req.version,
                actual,
                "Node activated a different cluster state version than requested"
            );
            (info.handle_activation_reply(req.version, false), None)
        }
        Err(RequestFailure::MethodNotSupported(_)) => {
            debug!(node = %req.node, "Node does not support activation, treating as activated");
            (info.handle_activation_reply(req.version, true), None)
        }
        Err(failure) => (info.handle_activation_reply(req.version, false), Some(failure)),
    }
}

/// Distributors that must ack a bundle: those available in its baseline
fn required_distributors<'a>(
    cluster: &'a ContentCluster,
    bundle: &'a ClusterStateBundle,
) -> impl Iterator<Item = &'a NodeInfo> + 'a {
    cluster
        .distributors()
        .filter(move |info| bundle.baseline().node_state(info.node()).state.is_available())
}

fn all_required_distributors<F>(cluster: &ContentCluster, bundle: &ClusterStateBundle, predicate: F) -> bool
where
    F: Fn(&NodeInfo) -> bool,
{
    required_distributors(cluster, bundle).all(|info| predicate(info))
}
