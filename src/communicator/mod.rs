//! Communicator interface
//!
//! The broadcaster hands bundles and activations to a `Communicator`, which
//! sends them asynchronously and reports the outcome through a waiter. A
//! waiter is consumed by `done`, so each request completes exactly once; a
//! waiter dropped without completion reports a failure instead.

pub mod loopback;
pub mod transport;

pub use loopback::{LoopbackBehavior, LoopbackTransport};
pub use transport::{RpcTransport, TokioCommunicator};

use std::sync::Arc;
use crate::broadcast::reply_queue::{
    ActivateClusterStateVersionRequest, CompletedRequest, ReplyQueue, SetClusterStateRequest,
};
use crate::cluster::NodeInfo;
use crate::error::RequestFailure;
use crate::state::ClusterStateBundle;
use crate::types::Node;

/// Issues cluster state requests to nodes. Implementations must not block.
pub trait Communicator {
    /// Send a state bundle to a node
    fn set_system_state(&self, bundle: Arc<ClusterStateBundle>, node: &NodeInfo, waiter: StateWaiter);

    /// Ask a node to activate a previously sent bundle version
    fn activate_cluster_state_version(&self, version: u32, node: &NodeInfo, waiter: ActivationWaiter);
}

/// Completion handle for a state bundle request
#[derive(Debug)]
pub struct StateWaiter {
    node: Node,
    version: u32,
    queue: Option<ReplyQueue>,
}

impl StateWaiter {
    pub(crate) fn new(node: Node, version: u32, queue: ReplyQueue) -> Self {
        Self { node, version, queue: Some(queue) }
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Report the outcome of the request
    pub fn done(mut self, result: Result<(), RequestFailure>) {
        self.complete(result);
    }

    fn complete(&mut self, result: Result<(), RequestFailure>) {
        if let Some(queue) = self.queue.take() {
            queue.push(CompletedRequest::SetState(SetClusterStateRequest {
                node: self.node,
                version: self.version,
                result,
            }));
        }
    }
}

impl Drop for StateWaiter {
    fn drop(&mut self) {
        let node = self.node;
        self.complete(Err(RequestFailure::ConnectionFailed {
            node,
            reason: "request dropped without completion".to_string(),
        }));
    }
}

/// Completion handle for an activation request
#[derive(Debug)]
pub struct ActivationWaiter {
    node: Node,
    version: u32,
    queue: Option<ReplyQueue>,
}

impl ActivationWaiter {
    pub(crate) fn new(node: Node, version: u32, queue: ReplyQueue) -> Self {
        Self { node, version, queue: Some(queue) }
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Report the outcome; `Ok` carries the version the node activated
    pub fn done(mut self, result: Result<u32, RequestFailure>) {
        self.complete(result);
    }

    fn complete(&mut self, result: Result<u32, RequestFailure>) {
        if let Some(queue) = self.queue.take() {
            queue.push(CompletedRequest::Activation(ActivateClusterStateVersionRequest {
                node: self.node,
                version: self.version,
                result,
            }));
        }
    }
}

impl Drop for ActivationWaiter {
    fn drop(&mut self) {
        let node = self.node;
        self.complete(Err(RequestFailure::ConnectionFailed {
            node,
            reason: "request dropped without completion".to_string(),
        }));
    }
}
