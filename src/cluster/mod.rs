//! Content cluster node registry
//!
//! Holds one `NodeInfo` per configured distributor and storage node. The
//! registry is owned by the control loop; topology changes come from the
//! coordination store, ack bookkeeping from the broadcaster.

pub mod node_info;

pub use node_info::{NodeInfo, ReplyDisposition};

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::state::NodeState;
use crate::types::{Node, NodeType, State};

/// A node as configured in the topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredNode {
    pub node: Node,
    #[serde(default)]
    pub rpc_address: Option<String>,
}

impl ConfiguredNode {
    pub fn new(node: Node, rpc_address: Option<String>) -> Self {
        Self { node, rpc_address }
    }
}

/// Nodes added and removed by a topology update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyChange {
    pub added: Vec<Node>,
    pub removed: Vec<Node>,
}

impl TopologyChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Registry of all nodes in a content cluster
#[derive(Debug, Clone)]
pub struct ContentCluster {
    name: String,
    nodes: BTreeMap<Node, NodeInfo>,
}

impl ContentCluster {
    /// Create an empty cluster
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Cluster with `node_count` distributors and `node_count` storage nodes
    pub fn flat(name: impl Into<String>, node_count: u16) -> Self {
        let mut cluster = Self::new(name);
        for index in 0..node_count {
            cluster.add_node(NodeInfo::new(Node::distributor(index)));
            cluster.add_node(NodeInfo::new(Node::storage(index)));
        }
        cluster
    }

    /// Cluster from a list of configured nodes
    pub fn from_configured(name: impl Into<String>, nodes: &[ConfiguredNode]) -> Self {
        let mut cluster = Self::new(name);
        cluster.apply_topology(nodes);
        cluster
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, info: NodeInfo) {
        self.nodes.insert(info.node(), info);
    }

    pub fn remove_node(&mut self, node: Node) -> Option<NodeInfo> {
        self.nodes.remove(&node)
    }

    pub fn node_info(&self, node: Node) -> Option<&NodeInfo> {
        self.nodes.get(&node)
    }

    pub fn node_info_mut(&mut self, node: Node) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(&node)
    }

    /// All nodes, distributors first, in index order
    pub fn node_infos(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn node_infos_mut(&mut self) -> impl Iterator<Item = &mut NodeInfo> {
        self.nodes.values_mut()
    }

    pub fn distributors(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values().filter(|info| info.is_distributor())
    }

    pub fn storage_nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values().filter(|info| info.node().node_type == NodeType::Storage)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark every node as reported up
    pub fn bring_entire_cluster_up(&mut self, time_ms: u64) {
        for info in self.nodes.values_mut() {
            let start_timestamp = info.start_timestamp();
            info.set_reported_state(NodeState::new(State::Up).with_start_timestamp(start_timestamp), time_ms);
        }
    }

    /// Give every node without an RPC address a placeholder one
    pub fn assign_dummy_rpc_addresses(&mut self) {
        for info in self.nodes.values_mut() {
            if info.rpc_address().is_none() {
                let node = info.node();
                info.set_rpc_address(Some(format!("tcp/{}.{}:0", node.node_type, node.index)));
            }
        }
    }

    /// Reconcile the registry with the authoritative topology. New nodes are
    /// added, vanished nodes dropped and RPC addresses refreshed; bookkeeping
    /// of nodes present in both is kept.
    pub fn apply_topology(&mut self, configured: &[ConfiguredNode]) -> TopologyChange {
        let wanted: BTreeSet<Node> = configured.iter().map(|c| c.node).collect();
        let mut change = TopologyChange::default();

        let removed: Vec<Node> = self.nodes.keys().filter(|node| !wanted.contains(node)).copied().collect();
        for node in removed {
            self.nodes.remove(&node);
            change.removed.push(node);
        }

        for entry in configured {
            match self.nodes.get_mut(&entry.node) {
                Some(info) => {
                    if entry.rpc_address.is_some() && info.rpc_address() != entry.rpc_address.as_deref() {
                        info.set_rpc_address(entry.rpc_address.clone());
                    }
                }
                None => {
                    let mut info = NodeInfo::new(entry.node);
                    info.set_rpc_address(entry.rpc_address.clone());
                    self.nodes.insert(entry.node, info);
                    change.added.push(entry.node);
                }
            }
        }

        if !change.is_empty() {
            info!(
                cluster = %self.name,
                added = change.added.len(),
                removed = change.removed.len(),
                "Applied topology change"
            );
        }
        change
    }
}
