//! Queue of completed requests
//!
//! Communicator callbacks run on transport threads. They only ever push into
//! this queue; the control loop drains it once per tick and is the sole
//! writer of node bookkeeping.

use std::collections::VecDeque;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::error::RequestFailure;
use crate::types::Node;

/// Completed cluster state bundle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetClusterStateRequest {
    pub node: Node,
    pub version: u32,
    pub result: Result<(), RequestFailure>,
}

/// Completed activation request. A successful reply carries the version
/// the node reports it activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateClusterStateVersionRequest {
    pub node: Node,
    pub version: u32,
    pub result: Result<u32, RequestFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedRequest {
    SetState(SetClusterStateRequest),
    Activation(ActivateClusterStateVersionRequest),
}

impl CompletedRequest {
    pub fn node(&self) -> Node {
        match self {
            CompletedRequest::SetState(req) => req.node,
            CompletedRequest::Activation(req) => req.node,
        }
    }
}

/// Shared, lock-protected FIFO of completed requests
#[derive(Debug, Clone, Default)]
pub struct ReplyQueue {
    inner: Arc<Mutex<VecDeque<CompletedRequest>>>,
}

impl ReplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, completed: CompletedRequest) {
        self.inner.lock().push_back(completed);
    }

    /// Take everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<CompletedRequest> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
