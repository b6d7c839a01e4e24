//! Cluster state bundles
//!
//! A bundle is the unit the controller publishes: a baseline state, optional
//! per bucket space overrides, and whether nodes must wait for an explicit
//! activation before acting on it. Bundles are immutable; every derivation
//! produces a new value.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::StateParseError;
use crate::state::ClusterState;
use crate::types::{Node, NodeType};

/// Versioned, immutable snapshot of cluster availability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStateBundle {
    baseline: ClusterState,
    bucket_space_states: BTreeMap<String, ClusterState>,
    deferred_activation: bool,
}

impl ClusterStateBundle {
    /// Start building a bundle around a baseline state
    pub fn builder(baseline: ClusterState) -> BundleBuilder {
        BundleBuilder {
            baseline,
            bucket_space_states: BTreeMap::new(),
            deferred_activation: false,
        }
    }

    /// Bundle with only a baseline state and no deferred activation
    pub fn of_baseline(baseline: ClusterState) -> Self {
        Self::builder(baseline).build()
    }

    /// Bundle from a baseline in the textual state format
    pub fn parse(baseline: &str) -> Result<Self, StateParseError> {
        Ok(Self::of_baseline(ClusterState::parse(baseline)?))
    }

    pub fn version(&self) -> u32 {
        self.baseline.version()
    }

    pub fn baseline(&self) -> &ClusterState {
        &self.baseline
    }

    pub fn bucket_space_states(&self) -> &BTreeMap<String, ClusterState> {
        &self.bucket_space_states
    }

    /// State for a bucket space; spaces without an override use the baseline
    pub fn state_for_bucket_space(&self, bucket_space: &str) -> &ClusterState {
        self.bucket_space_states.get(bucket_space).unwrap_or(&self.baseline)
    }

    pub fn deferred_activation(&self) -> bool {
        self.deferred_activation
    }

    /// New bundle with `mapper` applied to the baseline and every bucket
    /// space state. Version and activation mode are carried over.
    pub fn clone_with_mapper<F>(&self, mapper: F) -> ClusterStateBundle
    where
        F: Fn(&ClusterState) -> ClusterState,
    {
        ClusterStateBundle {
            baseline: mapper(&self.baseline),
            bucket_space_states: self
                .bucket_space_states
                .iter()
                .map(|(space, state)| (space.clone(), mapper(state)))
                .collect(),
            deferred_activation: self.deferred_activation,
        }
    }

    /// New bundle annotated with the startup timestamps of the given storage
    /// nodes (index to timestamp), in the baseline and in every bucket space.
    ///
    /// Indices outside a state's storage node count are not annotated in that
    /// state. The map is ordered, so the result is the same for the same input.
    pub fn clone_with_startup_timestamps(&self, timestamps: &BTreeMap<u16, u64>) -> ClusterStateBundle {
        self.clone_with_mapper(|state| {
            let mut annotated = state.clone();
            for (&index, &timestamp) in timestamps {
                if index >= annotated.node_count(NodeType::Storage) {
                    continue;
                }
                let node = Node::storage(index);
                let node_state = annotated.node_state(node).with_start_timestamp(timestamp);
                annotated.set_node_state(node, node_state);
            }
            annotated
        })
    }
}

/// Builder for `ClusterStateBundle`
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    baseline: ClusterState,
    bucket_space_states: BTreeMap<String, ClusterState>,
    deferred_activation: bool,
}

impl BundleBuilder {
    /// Set the bundle version (overrides any version in the baseline)
    pub fn version(mut self, version: u32) -> Self {
        self.baseline.set_version(version);
        self
    }

    /// Add an override state for a bucket space
    pub fn bucket_space(mut self, name: impl Into<String>, state: ClusterState) -> Self {
        self.bucket_space_states.insert(name.into(), state);
        self
    }

    pub fn deferred_activation(mut self, deferred: bool) -> Self {
        self.deferred_activation = deferred;
        self
    }

    /// Finish the bundle, stamping the baseline version onto every bucket
    /// space state
    pub fn build(self) -> ClusterStateBundle {
        let version = self.baseline.version();
        let bucket_space_states = self
            .bucket_space_states
            .into_iter()
            .map(|(space, mut state)| {
                state.set_version(version);
                (space, state)
            })
            .collect();
        ClusterStateBundle {
            baseline: self.baseline,
            bucket_space_states,
            deferred_activation: self.deferred_activation,
        }
    }
}
