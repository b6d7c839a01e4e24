//! Configuration
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! file is a valid configuration. Durations are given in milliseconds.
//!
//! ```toml
//! [broadcaster]
//! min_time_between_node_error_logging_ms = 600000
//!
//! [control_loop]
//! tick_interval_ms = 100
//! request_timeout_ms = 5000
//!
//! [cluster]
//! name = "music"
//! flat_node_count = 2
//! ```

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::cluster::{ConfiguredNode, ContentCluster};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Node;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetcastConfig {
    pub broadcaster: BroadcasterConfig,
    pub control_loop: ControlLoopConfig,
    pub cluster: ClusterConfig,
}

impl FleetcastConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: FleetcastConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.control_loop.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "control_loop.tick_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.control_loop.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "control_loop.request_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cluster.name.is_empty() {
            return Err(ConfigError::Invalid {
                key: "cluster.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Broadcaster tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Minimum time between warn-level logs of request failures per node
    pub min_time_between_node_error_logging_ms: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            min_time_between_node_error_logging_ms: 10 * 60 * 1000,
        }
    }
}

/// Control loop cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    pub tick_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl ControlLoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            request_timeout_ms: 5_000,
        }
    }
}

/// Cluster topology used when no coordination store supplies one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    /// Distributors and storage nodes created per index when `nodes` is empty
    pub flat_node_count: u16,
    pub nodes: Vec<ConfiguredNode>,
}

impl ClusterConfig {
    /// Configured nodes, expanding `flat_node_count` when no explicit list is given
    pub fn configured_nodes(&self) -> Vec<ConfiguredNode> {
        if !self.nodes.is_empty() {
            return self.nodes.clone();
        }
        (0..self.flat_node_count)
            .flat_map(|index| [Node::distributor(index), Node::storage(index)])
            .map(|node| ConfiguredNode::new(node, Some(format!("tcp/{}.{}:0", node.node_type, node.index))))
            .collect()
    }

    pub fn build_cluster(&self) -> ContentCluster {
        ContentCluster::from_configured(self.name.clone(), &self.configured_nodes())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "content".to_string(),
            flat_node_count: 2,
            nodes: Vec::new(),
        }
    }
}
