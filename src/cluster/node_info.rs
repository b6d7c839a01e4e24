//! Per-node bookkeeping for cluster state distribution
//!
//! Tracks which bundle version was sent to and acknowledged by a node, the
//! same for activations, and (for distributors) which storage node startup
//! timestamps the node is known to have observed.

use std::collections::BTreeMap;
use crate::state::NodeState;
use crate::types::{Node, State};

/// What happened to a completed request once matched against a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Reply acknowledged the version currently sent to the node
    Acked,
    /// Request for the current version failed; node will be retried
    Failed,
    /// Reply for a version the node is no longer being sent
    Stale,
}

/// Bookkeeping for one node in the content cluster
#[derive(Debug, Clone)]
pub struct NodeInfo {
    node: Node,
    rpc_address: Option<String>,
    reported_state: NodeState,
    reported_state_time_ms: u64,
    start_timestamp: u64,
    went_down_with_start_time: u64,
    /// Storage index to startup timestamp, distributors only
    observed_startup_timestamps: BTreeMap<u16, u64>,

    bundle_version_sent: Option<u32>,
    bundle_version_acked: Option<u32>,
    activation_version_sent: Option<u32>,
    activation_version_acked: Option<u32>,
    state_request_in_flight: Option<u32>,
    activation_request_in_flight: Option<u32>,
    /// Startup timestamps injected into the bundle currently sent
    startup_timestamps_sent: BTreeMap<u16, u64>,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            rpc_address: None,
            reported_state: NodeState::new(State::Down),
            reported_state_time_ms: 0,
            start_timestamp: 0,
            went_down_with_start_time: 0,
            observed_startup_timestamps: BTreeMap::new(),
            bundle_version_sent: None,
            bundle_version_acked: None,
            activation_version_sent: None,
            activation_version_acked: None,
            state_request_in_flight: None,
            activation_request_in_flight: None,
            startup_timestamps_sent: BTreeMap::new(),
        }
    }

    pub fn with_rpc_address(mut self, address: impl Into<String>) -> Self {
        self.rpc_address = Some(address.into());
        self
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn is_distributor(&self) -> bool {
        self.node.is_distributor()
    }

    pub fn rpc_address(&self) -> Option<&str> {
        self.rpc_address.as_deref()
    }

    pub fn set_rpc_address(&mut self, address: Option<String>) {
        self.rpc_address = address;
    }

    pub fn reported_state(&self) -> NodeState {
        self.reported_state
    }

    pub fn reported_state_time_ms(&self) -> u64 {
        self.reported_state_time_ms
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn set_start_timestamp(&mut self, start_timestamp: u64) {
        self.start_timestamp = start_timestamp;
    }

    /// Record a state reported by the node itself.
    ///
    /// A new startup timestamp means the node restarted. Going down and
    /// coming back with the same timestamp means it was cut off without
    /// restarting, and a distributor then has to be told the startup
    /// timestamps it may have missed.
    pub fn set_reported_state(&mut self, state: NodeState, time_ms: u64) {
        if state.start_timestamp != 0 && state.start_timestamp != self.start_timestamp {
            self.start_timestamp = state.start_timestamp;
            self.went_down_with_start_time = 0;
        }
        if state.state == State::Down && self.reported_state.state != State::Down {
            self.went_down_with_start_time = self.start_timestamp;
            self.observed_startup_timestamps.clear();
        }
        self.reported_state = state;
        self.reported_state_time_ms = time_ms;
    }

    /// Node went down and came back without a new startup timestamp
    pub fn was_partitioned_silently(&self) -> bool {
        self.start_timestamp != 0 && self.went_down_with_start_time == self.start_timestamp
    }

    /// Whether this node must be sent the startup timestamp of storage node
    /// `storage_index` explicitly. Only distributors that were silently
    /// partitioned away and have not observed the timestamp since need it.
    pub fn needs_startup_timestamp(&self, storage_index: u16, start_timestamp: u64) -> bool {
        self.is_distributor()
            && start_timestamp != 0
            && self.was_partitioned_silently()
            && self.observed_startup_timestamps.get(&storage_index) != Some(&start_timestamp)
    }

    pub fn has_observed_startup_timestamp(&self, storage_index: u16, start_timestamp: u64) -> bool {
        !self.needs_startup_timestamp(storage_index, start_timestamp)
    }

    pub fn bundle_version_sent(&self) -> Option<u32> {
        self.bundle_version_sent
    }

    pub fn bundle_version_acked(&self) -> Option<u32> {
        self.bundle_version_acked
    }

    pub fn activation_version_sent(&self) -> Option<u32> {
        self.activation_version_sent
    }

    pub fn activation_version_acked(&self) -> Option<u32> {
        self.activation_version_acked
    }

    pub fn state_request_in_flight(&self) -> Option<u32> {
        self.state_request_in_flight
    }

    pub fn activation_request_in_flight(&self) -> Option<u32> {
        self.activation_request_in_flight
    }

    /// Whether a state bundle of `version` still has to be sent
    pub fn needs_state_bundle(&self, version: u32) -> bool {
        self.state_request_in_flight != Some(version) && self.bundle_version_acked != Some(version)
    }

    /// Whether an activation of `version` still has to be sent
    pub fn needs_activation(&self, version: u32) -> bool {
        self.activation_request_in_flight != Some(version) && self.activation_version_acked != Some(version)
    }

    /// Record dispatch of a state bundle, with the startup timestamps that
    /// were injected into it for this node
    pub fn record_state_bundle_sent(&mut self, version: u32, startup_timestamps: BTreeMap<u16, u64>) {
        self.bundle_version_sent = Some(version);
        self.state_request_in_flight = Some(version);
        self.startup_timestamps_sent = startup_timestamps;
    }

    pub fn record_activation_sent(&mut self, version: u32) {
        self.activation_version_sent = Some(version);
        self.activation_request_in_flight = Some(version);
    }

    /// Match a completed state request against what was last sent
    pub fn handle_state_reply(&mut self, version: u32, acked: bool) -> ReplyDisposition {
        if self.state_request_in_flight == Some(version) {
            self.state_request_in_flight = None;
        }
        if self.bundle_version_sent != Some(version) {
            return ReplyDisposition::Stale;
        }
        if !acked {
            return ReplyDisposition::Failed;
        }
        self.bundle_version_acked = Some(version);
        let observed = std::mem::take(&mut self.startup_timestamps_sent);
        if self.is_distributor() {
            self.observed_startup_timestamps.extend(observed);
        }
        ReplyDisposition::Acked
    }

    /// Match a completed activation request against what was last sent
    pub fn handle_activation_reply(&mut self, version: u32, acked: bool) -> ReplyDisposition {
        if self.activation_request_in_flight == Some(version) {
            self.activation_request_in_flight = None;
        }
        if self.activation_version_sent != Some(version) {
            return ReplyDisposition::Stale;
        }
        if !acked {
            return ReplyDisposition::Failed;
        }
        self.activation_version_acked = Some(version);
        ReplyDisposition::Acked
    }
}
