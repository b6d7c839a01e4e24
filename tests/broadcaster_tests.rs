//! Integration tests for the system state broadcaster
//!
//! Drive the broadcaster tick by tick against a recording communicator that
//! never answers on its own; tests complete waiters explicitly to simulate
//! node replies.

use fleetcast::broadcast::{BroadcastPhase, SystemStateBroadcaster};
use fleetcast::cluster::ContentCluster;
use fleetcast::communicator::{ActivationWaiter, Communicator, StateWaiter};
use fleetcast::config::BroadcasterConfig;
use fleetcast::database::MemoryCoordinationStore;
use fleetcast::error::{BroadcastError, RequestFailure};
use fleetcast::state::{ClusterState, ClusterStateBundle, NodeState};
use fleetcast::timer::{FakeTimer, Timer};
use fleetcast::types::{Node, State};
use fleetcast::NodeInfo;
use parking_lot::Mutex;
use std::sync::Arc;

struct StateRequest {
    bundle: Arc<ClusterStateBundle>,
    node: Node,
    waiter: Option<StateWaiter>,
}

struct ActivationRequest {
    version: u32,
    node: Node,
    waiter: Option<ActivationWaiter>,
}

/// Records every request and holds on to its waiter
#[derive(Default)]
struct RecordingCommunicator {
    state_requests: Mutex<Vec<StateRequest>>,
    activation_requests: Mutex<Vec<ActivationRequest>>,
}

impl Communicator for RecordingCommunicator {
    fn set_system_state(&self, bundle: Arc<ClusterStateBundle>, node: &NodeInfo, waiter: StateWaiter) {
        self.state_requests.lock().push(StateRequest {
            bundle,
            node: node.node(),
            waiter: Some(waiter),
        });
    }

    fn activate_cluster_state_version(&self, version: u32, node: &NodeInfo, waiter: ActivationWaiter) {
        self.activation_requests.lock().push(ActivationRequest {
            version,
            node: node.node(),
            waiter: Some(waiter),
        });
    }
}

impl RecordingCommunicator {
    fn bundles_sent_to(&self, node: Node) -> Vec<Arc<ClusterStateBundle>> {
        self.state_requests
            .lock()
            .iter()
            .filter(|req| req.node == node)
            .map(|req| Arc::clone(&req.bundle))
            .collect()
    }

    fn activations_sent_to(&self, node: Node) -> Vec<u32> {
        self.activation_requests
            .lock()
            .iter()
            .filter(|req| req.node == node)
            .map(|req| req.version)
            .collect()
    }

    fn state_request_count(&self) -> usize {
        self.state_requests.lock().len()
    }

    fn take_state_waiter(&self, node: Node) -> StateWaiter {
        self.state_requests
            .lock()
            .iter_mut()
            .rev()
            .filter(|req| req.node == node)
            .find_map(|req| req.waiter.take())
            .unwrap_or_else(|| panic!("no outstanding state request for {}", node))
    }

    fn take_activation_waiter(&self, node: Node) -> ActivationWaiter {
        self.activation_requests
            .lock()
            .iter_mut()
            .rev()
            .filter(|req| req.node == node)
            .find_map(|req| req.waiter.take())
            .unwrap_or_else(|| panic!("no outstanding activation request for {}", node))
    }

    fn ack_state(&self, node: Node) {
        self.take_state_waiter(node).done(Ok(()));
    }

    fn fail_state(&self, node: Node) {
        self.take_state_waiter(node).done(Err(RequestFailure::Timeout(node)));
    }

    fn ack_activation(&self, node: Node) {
        let waiter = self.take_activation_waiter(node);
        let version = waiter.version();
        waiter.done(Ok(version));
    }
}

struct Fixture {
    timer: FakeTimer,
    broadcaster: SystemStateBroadcaster,
    communicator: RecordingCommunicator,
    store: MemoryCoordinationStore,
    cluster: ContentCluster,
    notified: Vec<u32>,
}

impl Fixture {
    fn for_flat_cluster(node_count: u16) -> Self {
        let timer = FakeTimer::new(10_000);
        let broadcaster = SystemStateBroadcaster::new(Arc::new(timer.clone()), BroadcasterConfig::default());
        let mut cluster = ContentCluster::flat("content", node_count);
        cluster.bring_entire_cluster_up(timer.current_time_ms());
        cluster.assign_dummy_rpc_addresses();
        Self {
            timer,
            broadcaster,
            communicator: RecordingCommunicator::default(),
            store: MemoryCoordinationStore::default(),
            cluster,
            notified: Vec::new(),
        }
    }

    /// Storage nodes get startup timestamps 600 and 700 while distributor 0
    /// goes down and comes back up with its old timestamp
    fn simulate_node_partitioned_away_silently(&mut self) {
        set_start_timestamp(&mut self.cluster, Node::storage(0), 600);
        set_start_timestamp(&mut self.cluster, Node::storage(1), 700);
        let distributor = node_info_mut(&mut self.cluster, Node::distributor(0));
        distributor.set_start_timestamp(500);
        distributor.set_reported_state(NodeState::new(State::Up).with_start_timestamp(500), 1000);
        distributor.set_reported_state(NodeState::new(State::Down).with_start_timestamp(500), 2000);
        distributor.set_reported_state(NodeState::new(State::Up).with_start_timestamp(500), 3000);
    }

    fn broadcast(&mut self) -> usize {
        self.broadcaster
            .broadcast_new_state_bundle_if_required(&mut self.cluster, &self.communicator)
    }

    fn check(&mut self) -> Result<bool, BroadcastError> {
        let notified = &mut self.notified;
        let mut listener = |bundle: &Arc<ClusterStateBundle>| notified.push(bundle.version());
        self.broadcaster
            .check_if_cluster_state_is_acked_by_all_distributors(&mut self.store, &self.cluster, &mut listener)
    }

    /// One control loop iteration without a new bundle. Replies queued
    /// before the call are applied after this tick's sends.
    fn tick(&mut self) -> Result<bool, BroadcastError> {
        self.broadcast();
        self.broadcaster.process_responses(&mut self.cluster);
        let converged = self.check();
        self.broadcaster
            .broadcast_state_activations_if_required(&mut self.cluster, &self.communicator);
        converged
    }

    fn converged_version(&self) -> Option<u32> {
        self.broadcaster
            .get_last_cluster_state_bundle_converged()
            .map(|bundle| bundle.version())
    }
}

fn node_info_mut(cluster: &mut ContentCluster, node: Node) -> &mut NodeInfo {
    cluster
        .node_info_mut(node)
        .unwrap_or_else(|| panic!("{} not in cluster", node))
}

fn set_start_timestamp(cluster: &mut ContentCluster, node: Node, timestamp: u64) {
    node_info_mut(cluster, node).set_start_timestamp(timestamp);
}

fn state(text: &str) -> ClusterState {
    ClusterState::parse(text).unwrap()
}

fn bundle(text: &str) -> Arc<ClusterStateBundle> {
    Arc::new(ClusterStateBundle::parse(text).unwrap())
}

fn bundle_with_bucket_spaces(baseline: &str, default: &str, upsidedown: &str) -> Arc<ClusterStateBundle> {
    Arc::new(
        ClusterStateBundle::builder(state(baseline))
            .bucket_space("default", state(default))
            .bucket_space("upsidedown", state(upsidedown))
            .build(),
    )
}

fn two_phase_bundle(deferred: bool) -> Arc<ClusterStateBundle> {
    Arc::new(
        ClusterStateBundle::builder(state("version:123 distributor:2 storage:2"))
            .deferred_activation(deferred)
            .build(),
    )
}

const ALL_NODES: [Node; 4] = [
    Node::distributor(0),
    Node::distributor(1),
    Node::storage(0),
    Node::storage(1),
];

const UNPARTITIONED_NODES: [Node; 3] = [Node::distributor(1), Node::storage(0), Node::storage(1)];

#[test]
fn test_always_publish_baseline_cluster_state() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = bundle("distributor:2 storage:2");
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    assert_eq!(f.broadcast(), 4);

    for node in ALL_NODES {
        let sent = f.communicator.bundles_sent_to(node);
        assert_eq!(sent.len(), 1, "{}", node);
        assert!(Arc::ptr_eq(&sent[0], &state_bundle), "{} got a copy", node);
    }
}

#[test]
fn test_non_observed_startup_timestamps_are_published_per_node_for_baseline_state() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = bundle("distributor:2 storage:2");
    f.simulate_node_partitioned_away_silently();
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();

    for node in UNPARTITIONED_NODES {
        assert_eq!(f.communicator.bundles_sent_to(node), vec![Arc::clone(&state_bundle)], "{}", node);
    }
    let expected = bundle("distributor:2 storage:2 .0.t:600 .1.t:700");
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(0)), vec![expected]);
}

#[test]
fn test_bucket_space_states_are_published_verbatim_when_no_additional_timestamps_needed() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = bundle_with_bucket_spaces(
        "distributor:2 storage:2",
        "distributor:2 storage:2 .0.s:d",
        "distributor:2 .0.s:d storage:2",
    );
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();

    for node in ALL_NODES {
        assert_eq!(f.communicator.bundles_sent_to(node), vec![Arc::clone(&state_bundle)], "{}", node);
    }
}

#[test]
fn test_non_observed_startup_timestamps_are_published_per_bucket_space_state() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = bundle_with_bucket_spaces(
        "distributor:2 storage:2",
        "distributor:2 storage:2 .0.s:d",
        "distributor:2 .0.s:d storage:2",
    );
    f.simulate_node_partitioned_away_silently();
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();

    for node in UNPARTITIONED_NODES {
        assert_eq!(f.communicator.bundles_sent_to(node), vec![Arc::clone(&state_bundle)], "{}", node);
    }
    let expected = bundle_with_bucket_spaces(
        "distributor:2 storage:2 .0.t:600 .1.t:700",
        "distributor:2 storage:2 .0.s:d .0.t:600 .1.t:700",
        "distributor:2 .0.s:d storage:2 .0.t:600 .1.t:700",
    );
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(0)), vec![expected]);
}

#[test]
fn test_acked_startup_timestamps_are_not_published_again() {
    let mut f = Fixture::for_flat_cluster(2);
    f.simulate_node_partitioned_away_silently();
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:2 storage:2"));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();

    f.broadcaster.handle_new_cluster_states(bundle("version:2 distributor:2 storage:2"));
    f.broadcast();
    let sent = f.communicator.bundles_sent_to(Node::distributor(0));
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].baseline().to_string(), "version:2 distributor:2 storage:2");
}

#[test]
fn test_failed_timestamp_bundle_is_resent_with_timestamps() {
    let mut f = Fixture::for_flat_cluster(2);
    f.simulate_node_partitioned_away_silently();
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:2 storage:2"));
    f.broadcast();
    f.communicator.fail_state(Node::distributor(0));
    f.tick().unwrap();
    f.tick().unwrap();

    let sent = f.communicator.bundles_sent_to(Node::distributor(0));
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].baseline().to_string(), "version:1 distributor:2 storage:2 .0.t:600 .1.t:700");
}

#[test]
fn test_activation_not_sent_before_all_distributors_have_acked_state_bundle() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = two_phase_bundle(true);
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();
    f.tick().unwrap();

    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();

    for node in ALL_NODES {
        assert!(f.communicator.activations_sent_to(node).is_empty(), "{}", node);
    }
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());

    f.communicator.ack_state(Node::distributor(1));
    f.tick().unwrap();

    for node in ALL_NODES {
        assert_eq!(f.communicator.activations_sent_to(node), vec![123], "{}", node);
    }
    assert_eq!(f.broadcaster.phase(), BroadcastPhase::AwaitingActivationAcks);
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());
}

#[test]
fn test_distributor_joining_during_activation_gets_activation_after_state_ack() {
    let mut f = Fixture::for_flat_cluster(1);
    let state_bundle = Arc::new(
        ClusterStateBundle::builder(state("version:5 distributor:2 storage:1"))
            .deferred_activation(true)
            .build(),
    );
    f.broadcaster.handle_new_cluster_states(state_bundle);
    f.tick().unwrap();
    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();
    assert_eq!(f.broadcaster.phase(), BroadcastPhase::AwaitingActivationAcks);
    assert_eq!(f.communicator.activations_sent_to(Node::distributor(0)), vec![5]);

    f.cluster
        .add_node(NodeInfo::new(Node::distributor(1)).with_rpc_address("tcp/distributor.1:0"));
    f.tick().unwrap();
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(1)).len(), 1);
    assert!(f.communicator.activations_sent_to(Node::distributor(1)).is_empty());
    assert_eq!(node_info_mut(&mut f.cluster, Node::distributor(1)).activation_version_sent(), None);

    f.communicator.ack_state(Node::distributor(1));
    f.tick().unwrap();
    assert_eq!(f.communicator.activations_sent_to(Node::distributor(1)), vec![5]);
    let joined = node_info_mut(&mut f.cluster, Node::distributor(1));
    assert_eq!(joined.bundle_version_acked(), Some(5));
    assert_eq!(joined.activation_version_sent(), Some(5));

    f.communicator.ack_activation(Node::distributor(0));
    f.communicator.ack_activation(Node::distributor(1));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(5));
}

#[test]
fn test_state_bundle_not_considered_converged_until_activation_acked_by_all_distributors() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = two_phase_bundle(true);
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();
    f.tick().unwrap();

    f.communicator.ack_state(Node::distributor(0));
    f.communicator.ack_state(Node::distributor(1));
    f.tick().unwrap();

    f.communicator.ack_activation(Node::distributor(0));
    assert!(!f.tick().unwrap());
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());

    f.communicator.ack_activation(Node::distributor(1));
    assert!(f.tick().unwrap());
    assert_eq!(f.broadcaster.get_last_cluster_state_bundle_converged(), Some(state_bundle));
    assert_eq!(f.broadcaster.phase(), BroadcastPhase::Converged);
}

#[test]
fn test_activation_not_sent_if_deferred_activation_is_disabled_in_state_bundle() {
    let mut f = Fixture::for_flat_cluster(2);
    let state_bundle = two_phase_bundle(false);
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();
    f.tick().unwrap();

    f.communicator.ack_state(Node::distributor(0));
    f.communicator.ack_state(Node::distributor(1));
    assert!(f.tick().unwrap());

    assert_eq!(f.broadcaster.get_last_cluster_state_bundle_converged(), Some(state_bundle));
    for node in ALL_NODES {
        assert!(f.communicator.activations_sent_to(node).is_empty(), "{}", node);
    }
}

#[test]
fn test_storage_acks_are_not_required_for_convergence() {
    let mut f = Fixture::for_flat_cluster(2);
    f.broadcaster.handle_new_cluster_states(two_phase_bundle(false));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    f.communicator.ack_state(Node::distributor(1));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(123));
}

#[test]
fn test_unavailable_distributor_is_not_required() {
    let mut f = Fixture::for_flat_cluster(2);
    f.broadcaster.handle_new_cluster_states(bundle("version:4 distributor:2 .1.s:d storage:2"));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(4));
}

#[test]
fn test_outstanding_request_is_not_resent() {
    let mut f = Fixture::for_flat_cluster(2);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:2 storage:2"));
    f.broadcast();
    f.tick().unwrap();
    f.tick().unwrap();
    assert_eq!(f.communicator.state_request_count(), 4);
}

#[test]
fn test_failed_request_is_retried_on_next_tick() {
    let mut f = Fixture::for_flat_cluster(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:1 storage:1"));
    f.broadcast();

    f.communicator.fail_state(Node::distributor(0));
    f.timer.advance_ms(100);
    assert!(!f.tick().unwrap());
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(0)).len(), 1);
    assert!(!f.tick().unwrap());
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(0)).len(), 2);

    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(1));
}

#[test]
fn test_reply_for_superseded_version_is_ignored() {
    let mut f = Fixture::for_flat_cluster(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:1 storage:1"));
    f.broadcast();
    let old_waiter = f.communicator.take_state_waiter(Node::distributor(0));

    f.broadcaster.handle_new_cluster_states(bundle("version:2 distributor:1 storage:1"));
    f.broadcast();
    old_waiter.done(Ok(()));
    assert!(!f.tick().unwrap());
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());

    let info = f.cluster.node_info(Node::distributor(0)).unwrap();
    assert_eq!(info.bundle_version_acked(), None);
    assert_eq!(info.bundle_version_sent(), Some(2));

    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(2));
}

#[test]
fn test_dropped_waiter_counts_as_failure() {
    let mut f = Fixture::for_flat_cluster(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:1 storage:1"));
    f.broadcast();
    drop(f.communicator.take_state_waiter(Node::distributor(0)));

    let summary = f.broadcaster.process_responses(&mut f.cluster);
    assert_eq!(summary.failed, 1);
    f.broadcast();
    assert_eq!(f.communicator.bundles_sent_to(Node::distributor(0)).len(), 2);
}

#[test]
fn test_converged_bundle_is_persisted_and_notified_once() {
    let mut f = Fixture::for_flat_cluster(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:9 distributor:1 storage:1"));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());
    assert!(!f.tick().unwrap());
    assert!(!f.tick().unwrap());

    assert_eq!(f.notified, vec![9]);
    let persisted: Vec<u32> = f.store.converged_bundles().iter().map(|b| b.version()).collect();
    assert_eq!(persisted, vec![9]);
}

#[test]
fn test_persistence_failure_is_retried() {
    let mut f = Fixture::for_flat_cluster(1);
    f.store.fail_next_writes(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:3 distributor:1 storage:1"));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));

    match f.tick() {
        Err(BroadcastError::Persistence { version, .. }) => assert_eq!(version, 3),
        other => panic!("expected persistence failure, got {:?}", other),
    }
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());
    assert!(f.notified.is_empty());

    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(3));
    assert_eq!(f.notified, vec![3]);
}

#[test]
fn test_resending_identical_bundle_keeps_progress() {
    let mut f = Fixture::for_flat_cluster(1);
    let state_bundle = bundle("version:5 distributor:1 storage:1");
    f.broadcaster.handle_new_cluster_states(Arc::clone(&state_bundle));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());

    f.broadcaster.handle_new_cluster_states(bundle("version:5 distributor:1 storage:1"));
    assert_eq!(f.broadcast(), 0);
    assert_eq!(f.converged_version(), Some(5));
    assert_eq!(f.broadcaster.phase(), BroadcastPhase::Converged);
}

#[test]
fn test_new_bundle_clears_last_converged() {
    let mut f = Fixture::for_flat_cluster(1);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:1 storage:1"));
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    assert!(f.tick().unwrap());

    f.broadcaster.handle_new_cluster_states(bundle("version:2 distributor:1 storage:1"));
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());
    assert_eq!(f.broadcaster.phase(), BroadcastPhase::Pending);
}

#[test]
fn test_activation_without_method_support_counts_as_acked() {
    let mut f = Fixture::for_flat_cluster(1);
    let state_bundle = Arc::new(
        ClusterStateBundle::builder(state("version:8 distributor:1 storage:1"))
            .deferred_activation(true)
            .build(),
    );
    f.broadcaster.handle_new_cluster_states(state_bundle);
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();

    f.communicator
        .take_activation_waiter(Node::distributor(0))
        .done(Err(RequestFailure::MethodNotSupported(Node::distributor(0))));
    assert!(f.tick().unwrap());
    assert_eq!(f.converged_version(), Some(8));
}

#[test]
fn test_activation_of_other_version_is_not_an_ack() {
    let mut f = Fixture::for_flat_cluster(1);
    let state_bundle = Arc::new(
        ClusterStateBundle::builder(state("version:8 distributor:1 storage:1"))
            .deferred_activation(true)
            .build(),
    );
    f.broadcaster.handle_new_cluster_states(state_bundle);
    f.broadcast();
    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();

    f.communicator.take_activation_waiter(Node::distributor(0)).done(Ok(7));
    assert!(!f.tick().unwrap());
    assert!(f.broadcaster.get_last_cluster_state_bundle_converged().is_none());
    assert_eq!(f.communicator.activations_sent_to(Node::distributor(0)), vec![8, 8]);
}

#[test]
fn test_node_without_rpc_address_is_not_sent_to() {
    let mut f = Fixture::for_flat_cluster(1);
    node_info_mut(&mut f.cluster, Node::storage(0)).set_rpc_address(None);
    f.broadcaster.handle_new_cluster_states(bundle("version:1 distributor:1 storage:1"));
    assert_eq!(f.broadcast(), 1);
    assert!(f.communicator.bundles_sent_to(Node::storage(0)).is_empty());
}

#[test]
fn test_status_handle_tracks_pending_acks() {
    let mut f = Fixture::for_flat_cluster(2);
    let handle = f.broadcaster.status_handle();
    f.broadcaster.handle_new_cluster_states(two_phase_bundle(true));
    f.tick().unwrap();
    f.broadcaster.publish_status(Some(&f.cluster));
    let status = handle.snapshot();
    assert_eq!(status.phase, BroadcastPhase::AwaitingStateAcks);
    assert_eq!(status.pending_state_acks, 2);
    assert_eq!(status.pending_activation_acks, 2);

    f.communicator.ack_state(Node::distributor(0));
    f.tick().unwrap();
    f.broadcaster.publish_status(Some(&f.cluster));
    assert_eq!(handle.snapshot().pending_state_acks, 1);
}
