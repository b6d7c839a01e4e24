//! In-process transport for simulation and tests
//!
//! Every node "receives" requests in memory. Per-node behavior decides
//! whether it acks, fails, never answers, or lacks the activation RPC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use crate::communicator::RpcTransport;
use crate::error::RequestFailure;
use crate::state::ClusterStateBundle;
use crate::types::Node;

/// How a simulated node answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopbackBehavior {
    #[default]
    Ack,
    /// Ack after the given delay
    AckAfter(Duration),
    /// Reject every request
    Fail,
    /// Never answer
    Silent,
    /// Ack state bundles but reject activation as an unknown method
    NoActivationSupport,
}

#[derive(Debug, Default)]
struct LoopbackState {
    behaviors: HashMap<Node, LoopbackBehavior>,
    received_bundles: HashMap<Node, Vec<Arc<ClusterStateBundle>>>,
    activated_versions: HashMap<Node, Vec<u32>>,
}

/// Transport where every node lives in this process
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, node: Node, behavior: LoopbackBehavior) {
        self.state.lock().behaviors.insert(node, behavior);
    }

    fn behavior(&self, node: Node) -> LoopbackBehavior {
        self.state.lock().behaviors.get(&node).copied().unwrap_or_default()
    }

    /// Bundles a node has accepted, oldest first
    pub fn received_bundles(&self, node: Node) -> Vec<Arc<ClusterStateBundle>> {
        self.state.lock().received_bundles.get(&node).cloned().unwrap_or_default()
    }

    /// Versions a node has activated, oldest first
    pub fn activated_versions(&self, node: Node) -> Vec<u32> {
        self.state.lock().activated_versions.get(&node).cloned().unwrap_or_default()
    }

    async fn answer(&self, node: Node) -> Result<(), RequestFailure> {
        match self.behavior(node) {
            LoopbackBehavior::Ack | LoopbackBehavior::NoActivationSupport => Ok(()),
            LoopbackBehavior::AckAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            LoopbackBehavior::Fail => Err(RequestFailure::Rejected {
                node,
                reason: "simulated failure".to_string(),
            }),
            LoopbackBehavior::Silent => std::future::pending::<Result<(), RequestFailure>>().await,
        }
    }
}

#[async_trait]
impl RpcTransport for LoopbackTransport {
    async fn set_cluster_state_bundle(
        &self,
        node: Node,
        _address: &str,
        bundle: Arc<ClusterStateBundle>,
    ) -> Result<(), RequestFailure> {
        self.answer(node).await?;
        self.state.lock().received_bundles.entry(node).or_default().push(bundle);
        Ok(())
    }

    async fn activate_version(&self, node: Node, _address: &str, version: u32) -> Result<u32, RequestFailure> {
        if self.behavior(node) == LoopbackBehavior::NoActivationSupport {
            return Err(RequestFailure::MethodNotSupported(node));
        }
        self.answer(node).await?;
        self.state.lock().activated_versions.entry(node).or_default().push(version);
        Ok(version)
    }
}
