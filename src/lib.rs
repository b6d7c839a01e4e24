//! # fleetcast
//!
//! Cluster state distribution for a content cluster controller.
//!
//! The controller computes versioned cluster state bundles elsewhere;
//! fleetcast gets each bundle to every distributor and storage node, tracks
//! which nodes acknowledged it, and for bundles with deferred activation
//! runs a second round so no node acts on a new bucket ownership view before
//! every distributor has stored it.

#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod state;
pub mod cluster;
pub mod communicator;
pub mod broadcast;
pub mod database;
pub mod timer;
pub mod config;
pub mod control_loop;
/// Command-line interface and argument parsing
pub mod cli;
/// Command execution
pub mod commands;

// Re-export main types
pub use types::{Node, NodeType, State};
pub use error::{FleetcastError, FleetcastResult, StateParseError, StoreError, BroadcastError, ConfigError, RequestFailure};
pub use state::{ClusterState, ClusterStateBundle, BundleBuilder, NodeState};
pub use cluster::{ContentCluster, NodeInfo, ConfiguredNode};
pub use communicator::{Communicator, StateWaiter, ActivationWaiter, RpcTransport, TokioCommunicator};
pub use broadcast::{SystemStateBroadcaster, BroadcastPhase, BroadcastStatus, BroadcastStatusHandle};
pub use database::{CoordinationStore, ConvergenceListener, MemoryCoordinationStore};
pub use timer::{Timer, SystemTimer, FakeTimer};
pub use config::FleetcastConfig;
pub use control_loop::{ControlLoop, TickOutcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
