//! Core types shared by the state, cluster and broadcast modules

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::StateParseError;

/// Role of a content node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Distributor node (owns buckets, routes operations)
    Distributor,
    /// Storage node (holds data)
    Storage,
}

impl NodeType {
    /// Key used for this node type in the textual state format
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Distributor => "distributor",
            NodeType::Storage => "storage",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the content cluster, identified by type and index.
///
/// Distributors order before storage nodes, then by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    pub node_type: NodeType,
    pub index: u16,
}

impl Node {
    pub const fn new(node_type: NodeType, index: u16) -> Self {
        Self { node_type, index }
    }

    pub const fn distributor(index: u16) -> Self {
        Self::new(NodeType::Distributor, index)
    }

    pub const fn storage(index: u16) -> Self {
        Self::new(NodeType::Storage, index)
    }

    pub fn is_distributor(&self) -> bool {
        self.node_type == NodeType::Distributor
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_type, self.index)
    }
}

/// Availability of a single node as seen by the cluster controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Up,
    Down,
    Maintenance,
    Retired,
    Initializing,
    Stopping,
}

impl State {
    /// Single-character code used by the textual state format
    pub fn code(&self) -> char {
        match self {
            State::Up => 'u',
            State::Down => 'd',
            State::Maintenance => 'm',
            State::Retired => 'r',
            State::Initializing => 'i',
            State::Stopping => 's',
        }
    }

    pub fn from_code(code: &str) -> Result<Self, StateParseError> {
        match code {
            "u" => Ok(State::Up),
            "d" => Ok(State::Down),
            "m" => Ok(State::Maintenance),
            "r" => Ok(State::Retired),
            "i" => Ok(State::Initializing),
            "s" => Ok(State::Stopping),
            other => Err(StateParseError::UnknownState(other.to_string())),
        }
    }

    /// Whether a node in this state is expected to receive and acknowledge
    /// cluster states (up, initializing or retired).
    pub fn is_available(&self) -> bool {
        matches!(self, State::Up | State::Initializing | State::Retired)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Up => "up",
            State::Down => "down",
            State::Maintenance => "maintenance",
            State::Retired => "retired",
            State::Initializing => "initializing",
            State::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
