//! Tokio-backed communicator
//!
//! Adapts an async `RpcTransport` to the non-blocking `Communicator` the
//! broadcaster drives: each request runs as its own task on a runtime
//! handle, bounded by the request timeout, and completes its waiter from
//! that task.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::trace;
use crate::cluster::NodeInfo;
use crate::communicator::{ActivationWaiter, Communicator, StateWaiter};
use crate::error::RequestFailure;
use crate::state::ClusterStateBundle;
use crate::types::Node;

/// Wire-level RPC operations towards content nodes
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Deliver a state bundle; resolves when the node has stored it
    async fn set_cluster_state_bundle(
        &self,
        node: Node,
        address: &str,
        bundle: Arc<ClusterStateBundle>,
    ) -> Result<(), RequestFailure>;

    /// Activate a bundle version; resolves to the version the node activated
    async fn activate_version(&self, node: Node, address: &str, version: u32) -> Result<u32, RequestFailure>;
}

/// `Communicator` spawning one tokio task per request
pub struct TokioCommunicator<T: RpcTransport> {
    transport: Arc<T>,
    handle: Handle,
    request_timeout: Duration,
}

impl<T: RpcTransport> TokioCommunicator<T> {
    pub fn new(transport: Arc<T>, handle: Handle, request_timeout: Duration) -> Self {
        Self {
            transport,
            handle,
            request_timeout,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

fn no_address(node: Node) -> RequestFailure {
    RequestFailure::ConnectionFailed {
        node,
        reason: "no RPC address".to_string(),
    }
}

impl<T: RpcTransport> Communicator for TokioCommunicator<T> {
    fn set_system_state(&self, bundle: Arc<ClusterStateBundle>, node: &NodeInfo, waiter: StateWaiter) {
        let target = node.node();
        let Some(address) = node.rpc_address().map(str::to_string) else {
            waiter.done(Err(no_address(target)));
            return;
        };
        let transport = Arc::clone(&self.transport);
        let request_timeout = self.request_timeout;

        self.handle.spawn(async move {
            trace!(node = %target, version = bundle.version(), "Sending cluster state bundle");
            let result = match tokio::time::timeout(
                request_timeout,
                transport.set_cluster_state_bundle(target, &address, bundle),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RequestFailure::Timeout(target)),
            };
            waiter.done(result);
        });
    }

    fn activate_cluster_state_version(&self, version: u32, node: &NodeInfo, waiter: ActivationWaiter) {
        let target = node.node();
        let Some(address) = node.rpc_address().map(str::to_string) else {
            waiter.done(Err(no_address(target)));
            return;
        };
        let transport = Arc::clone(&self.transport);
        let request_timeout = self.request_timeout;

        self.handle.spawn(async move {
            trace!(node = %target, version, "Sending cluster state activation");
            let result = match tokio::time::timeout(request_timeout, transport.activate_version(target, &address, version)).await {
                Ok(result) => result,
                Err(_) => Err(RequestFailure::Timeout(target)),
            };
            waiter.done(result);
        });
    }
}
