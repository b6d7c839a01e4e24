//! Error types for fleetcast

use thiserror::Error;
use crate::types::Node;

/// Main error type for fleetcast operations
#[derive(Error, Debug)]
pub enum FleetcastError {
    /// Cluster state parsing errors
    #[error("State parse error: {0}")]
    StateParse(#[from] StateParseError),

    /// Coordination store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Broadcast errors
    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while parsing the textual cluster state format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateParseError {
    /// Token is not of the form `key:value`
    #[error("Malformed token '{0}'")]
    MalformedToken(String),

    /// Key is not part of the format
    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    /// Value could not be parsed as a number
    #[error("Invalid number '{value}' for key '{key}'")]
    InvalidNumber { key: String, value: String },

    /// Unknown node state code
    #[error("Unknown node state '{0}'")]
    UnknownState(String),

    /// Node override refers to an index at or beyond its type's node count
    #[error("Node override '{0}' is outside the node count")]
    IndexOutOfRange(String),

    /// Node override before any `distributor:` or `storage:` token
    #[error("Node override '{0}' appears before a node type count")]
    OverrideWithoutNodeType(String),

    /// A `distributor:` or `storage:` count given more than once
    #[error("Node count '{0}' given more than once")]
    DuplicateNodeCount(String),
}

/// Coordination store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store is not reachable
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),
}

/// Broadcaster errors. None of these are fatal to the control loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// Persisting a converged bundle failed; convergence is retried next tick
    #[error("Failed to persist converged bundle version {version}: {source}")]
    Persistence {
        version: u32,
        #[source]
        source: StoreError,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Config file is not valid TOML for the config schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config value out of range
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Failure reported by a communicator for a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// No reply within the request timeout
    #[error("Request to {0} timed out")]
    Timeout(Node),

    /// Transport-level failure
    #[error("Connection to {node} failed: {reason}")]
    ConnectionFailed { node: Node, reason: String },

    /// Node does not implement the called RPC method
    #[error("Node {0} does not support the requested method")]
    MethodNotSupported(Node),

    /// Node rejected the request
    #[error("Node {node} rejected request: {reason}")]
    Rejected { node: Node, reason: String },
}

pub type FleetcastResult<T> = Result<T, FleetcastError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type BroadcastResult<T> = Result<T, BroadcastError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
