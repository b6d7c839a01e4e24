//! Single-threaded control loop driving the broadcaster
//!
//! Each tick refreshes the topology from the coordination store, picks up
//! newly submitted bundles and runs the broadcaster steps in their fixed
//! order. No step waits on the network, and no error stops the loop.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use crate::broadcast::{BroadcastStatusHandle, ReplySummary, SystemStateBroadcaster};
use crate::cluster::{ContentCluster, TopologyChange};
use crate::communicator::Communicator;
use crate::config::{BroadcasterConfig, ControlLoopConfig};
use crate::database::{ConvergenceListener, CoordinationStore};
use crate::error::FleetcastError;
use crate::state::ClusterStateBundle;
use crate::timer::Timer;

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub topology: TopologyChange,
    pub state_requests_sent: usize,
    pub activations_sent: usize,
    pub replies: ReplySummary,
    /// Bundle that converged during this tick
    pub converged: Option<Arc<ClusterStateBundle>>,
    /// Recoverable errors hit during this tick
    pub errors: Vec<FleetcastError>,
}

/// Owns the node registry and runs the broadcaster against it
pub struct ControlLoop<C, S, L> {
    cluster: ContentCluster,
    broadcaster: SystemStateBroadcaster,
    communicator: C,
    store: S,
    listener: L,
    config: ControlLoopConfig,
    bundle_tx: mpsc::UnboundedSender<Arc<ClusterStateBundle>>,
    bundle_rx: mpsc::UnboundedReceiver<Arc<ClusterStateBundle>>,
    ticks: u64,
}

impl<C, S, L> ControlLoop<C, S, L>
where
    C: Communicator,
    S: CoordinationStore,
    L: ConvergenceListener,
{
    pub fn new(
        cluster: ContentCluster,
        communicator: C,
        store: S,
        listener: L,
        timer: Arc<dyn Timer>,
        broadcaster_config: BroadcasterConfig,
        config: ControlLoopConfig,
    ) -> Self {
        let (bundle_tx, bundle_rx) = mpsc::unbounded_channel();
        Self {
            cluster,
            broadcaster: SystemStateBroadcaster::new(timer, broadcaster_config),
            communicator,
            store,
            listener,
            config,
            bundle_tx,
            bundle_rx,
            ticks: 0,
        }
    }

    pub fn cluster(&self) -> &ContentCluster {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut ContentCluster {
        &mut self.cluster
    }

    pub fn broadcaster(&self) -> &SystemStateBroadcaster {
        &self.broadcaster
    }

    pub fn communicator(&self) -> &C {
        &self.communicator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn status_handle(&self) -> BroadcastStatusHandle {
        self.broadcaster.status_handle()
    }

    /// Sender other tasks can use to hand in new bundles; they take effect
    /// at the start of the next tick
    pub fn bundle_sender(&self) -> mpsc::UnboundedSender<Arc<ClusterStateBundle>> {
        self.bundle_tx.clone()
    }

    /// Hand a new bundle to the broadcaster directly
    pub fn submit_bundle(&mut self, bundle: impl Into<Arc<ClusterStateBundle>>) {
        self.broadcaster.handle_new_cluster_states(bundle);
    }

    /// Run one control loop iteration
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.ticks += 1;

        match self.store.current_topology() {
            Ok(topology) => outcome.topology = self.cluster.apply_topology(&topology),
            Err(e) => {
                warn!(error = %e, "Failed to read topology, keeping current node set");
                outcome.errors.push(e.into());
            }
        }

        while let Ok(bundle) = self.bundle_rx.try_recv() {
            self.broadcaster.handle_new_cluster_states(bundle);
        }

        outcome.state_requests_sent = self
            .broadcaster
            .broadcast_new_state_bundle_if_required(&mut self.cluster, &self.communicator);
        outcome.replies = self.broadcaster.process_responses(&mut self.cluster);

        match self.broadcaster.check_if_cluster_state_is_acked_by_all_distributors(
            &mut self.store,
            &self.cluster,
            &mut self.listener,
        ) {
            Ok(true) => outcome.converged = self.broadcaster.get_last_cluster_state_bundle_converged(),
            Ok(false) => {}
            Err(e) => outcome.errors.push(e.into()),
        }

        outcome.activations_sent = self
            .broadcaster
            .broadcast_state_activations_if_required(&mut self.cluster, &self.communicator);
        self.broadcaster.publish_status(Some(&self.cluster));

        debug!(
            tick = self.ticks,
            phase = %self.broadcaster.phase(),
            sent = outcome.state_requests_sent,
            activations = outcome.activations_sent,
            acked = outcome.replies.acked,
            failed = outcome.replies.failed,
            "Control loop tick"
        );
        outcome
    }

    /// Tick on the configured interval until `shutdown` turns true or its
    /// sender is dropped. Returns the loop so callers can inspect it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(cluster = %self.cluster.name(), interval_ms = self.config.tick_interval_ms, "Control loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(cluster = %self.cluster.name(), ticks = self.ticks, "Control loop stopped");
        self
    }
}
