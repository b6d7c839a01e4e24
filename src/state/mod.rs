//! Cluster state model
//!
//! A `ClusterState` describes the availability of every distributor and
//! storage node at one version. It has a compact textual form used in logs,
//! tests and the coordination store:
//!
//! ```text
//! version:123 distributor:2 .0.s:d storage:2 .0.t:600 .1.t:700
//! ```
//!
//! Nodes with an index below their type's count default to `Up` with no
//! startup timestamp; only deviations from that default are rendered.

pub mod bundle;

pub use bundle::{BundleBuilder, ClusterStateBundle};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::StateParseError;
use crate::types::{Node, NodeType, State};

const DEFAULT_DISTRIBUTION_BITS: u16 = 16;

/// State of a single node within a cluster state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub state: State,
    /// Startup timestamp of the node process; 0 when not announced
    pub start_timestamp: u64,
}

impl NodeState {
    pub fn new(state: State) -> Self {
        Self { state, start_timestamp: 0 }
    }

    pub fn with_start_timestamp(mut self, start_timestamp: u64) -> Self {
        self.start_timestamp = start_timestamp;
        self
    }

    fn is_default(&self) -> bool {
        self.state == State::Up && self.start_timestamp == 0
    }
}

/// Node states for one node type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NodeStates {
    count: u16,
    /// Only non-default states for indices below `count`
    overrides: BTreeMap<u16, NodeState>,
}

impl NodeStates {
    fn get(&self, index: u16) -> NodeState {
        if index >= self.count {
            return NodeState::new(State::Down);
        }
        self.overrides.get(&index).copied().unwrap_or_default()
    }

    fn set(&mut self, index: u16, node_state: NodeState) {
        if index >= self.count {
            if node_state.state == State::Down && node_state.start_timestamp == 0 {
                return;
            }
            let Some(count) = index.checked_add(1) else {
                return;
            };
            for gap in self.count..index {
                self.overrides.insert(gap, NodeState::new(State::Down));
            }
            self.count = count;
        }
        if node_state.is_default() {
            self.overrides.remove(&index);
        } else {
            self.overrides.insert(index, node_state);
        }
    }
}

/// Versioned availability state of the whole content cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterState {
    version: u32,
    cluster_up: bool,
    distribution_bits: u16,
    distributors: NodeStates,
    storage: NodeStates,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            version: 0,
            cluster_up: true,
            distribution_bits: DEFAULT_DISTRIBUTION_BITS,
            distributors: NodeStates::default(),
            storage: NodeStates::default(),
        }
    }
}

impl ClusterState {
    /// Create an empty cluster state with no nodes
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the textual state format
    pub fn parse(text: &str) -> Result<Self, StateParseError> {
        let mut state = ClusterState::default();
        let mut current: Option<NodeType> = None;
        let mut seen_counts: HashSet<NodeType> = HashSet::new();

        for token in text.split_whitespace() {
            if let Some(rest) = token.strip_prefix('.') {
                let node_type = current
                    .ok_or_else(|| StateParseError::OverrideWithoutNodeType(token.to_string()))?;
                state.parse_node_override(node_type, token, rest)?;
                continue;
            }

            let (key, value) = split_key_value(token)?;
            match key {
                "version" => state.version = parse_number(key, value)?,
                "cluster" => state.cluster_up = State::from_code(value)? != State::Down,
                "bits" => state.distribution_bits = parse_number(key, value)?,
                "distributor" | "storage" => {
                    let node_type = if key == "distributor" { NodeType::Distributor } else { NodeType::Storage };
                    if !seen_counts.insert(node_type) {
                        return Err(StateParseError::DuplicateNodeCount(token.to_string()));
                    }
                    state.states_mut(node_type).count = parse_number(key, value)?;
                    current = Some(node_type);
                }
                other => return Err(StateParseError::UnknownKey(other.to_string())),
            }
        }

        Ok(state)
    }

    fn parse_node_override(&mut self, node_type: NodeType, token: &str, rest: &str) -> Result<(), StateParseError> {
        let (index, field) = rest
            .split_once('.')
            .ok_or_else(|| StateParseError::MalformedToken(token.to_string()))?;
        let index: u16 = parse_number("node index", index)?;
        let (key, value) = split_key_value(field)?;

        let states = self.states_mut(node_type);
        if index >= states.count {
            return Err(StateParseError::IndexOutOfRange(token.to_string()));
        }
        let mut node_state = states.get(index);
        match key {
            "s" => node_state.state = State::from_code(value)?,
            "t" => node_state.start_timestamp = parse_number(key, value)?,
            other => return Err(StateParseError::UnknownKey(other.to_string())),
        }
        states.set(index, node_state);
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn is_cluster_up(&self) -> bool {
        self.cluster_up
    }

    pub fn set_cluster_up(&mut self, up: bool) {
        self.cluster_up = up;
    }

    pub fn distribution_bits(&self) -> u16 {
        self.distribution_bits
    }

    /// Number of nodes of the given type covered by this state
    pub fn node_count(&self, node_type: NodeType) -> u16 {
        self.states(node_type).count
    }

    /// State of a node; nodes outside the node count are `Down`
    pub fn node_state(&self, node: Node) -> NodeState {
        self.states(node.node_type).get(node.index)
    }

    /// Set the state of a node, growing the node count if needed
    pub fn set_node_state(&mut self, node: Node, node_state: NodeState) {
        self.states_mut(node.node_type).set(node.index, node_state);
    }

    /// All nodes of the given type with their states, in index order
    pub fn nodes(&self, node_type: NodeType) -> impl Iterator<Item = (Node, NodeState)> + '_ {
        let states = self.states(node_type);
        (0..states.count).map(move |index| (Node::new(node_type, index), states.get(index)))
    }

    fn states(&self, node_type: NodeType) -> &NodeStates {
        match node_type {
            NodeType::Distributor => &self.distributors,
            NodeType::Storage => &self.storage,
        }
    }

    fn states_mut(&mut self, node_type: NodeType) -> &mut NodeStates {
        match node_type {
            NodeType::Distributor => &mut self.distributors,
            NodeType::Storage => &mut self.storage,
        }
    }
}

fn split_key_value(token: &str) -> Result<(&str, &str), StateParseError> {
    token
        .split_once(':')
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .ok_or_else(|| StateParseError::MalformedToken(token.to_string()))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, StateParseError> {
    value.parse().map_err(|_| StateParseError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<String> = Vec::new();
        if self.version != 0 {
            tokens.push(format!("version:{}", self.version));
        }
        if !self.cluster_up {
            tokens.push("cluster:d".to_string());
        }
        if self.distribution_bits != DEFAULT_DISTRIBUTION_BITS {
            tokens.push(format!("bits:{}", self.distribution_bits));
        }
        for node_type in [NodeType::Distributor, NodeType::Storage] {
            let states = self.states(node_type);
            if states.count == 0 {
                continue;
            }
            tokens.push(format!("{}:{}", node_type, states.count));
            for (index, node_state) in &states.overrides {
                if node_state.state != State::Up {
                    tokens.push(format!(".{}.s:{}", index, node_state.state.code()));
                }
                if node_state.start_timestamp != 0 {
                    tokens.push(format!(".{}.t:{}", index, node_state.start_timestamp));
                }
            }
        }
        f.write_str(&tokens.join(" "))
    }
}

impl FromStr for ClusterState {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClusterState::parse(s)
    }
}

impl TryFrom<String> for ClusterState {
    type Error = StateParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClusterState::parse(&value)
    }
}

impl From<ClusterState> for String {
    fn from(state: ClusterState) -> Self {
        state.to_string()
    }
}
