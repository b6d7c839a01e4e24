use std::sync::Arc;
use anyhow::{bail, Context};
use colored::*;
use parking_lot::Mutex;
use serde_json::json;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;
use crate::broadcast::BroadcastStatus;
use crate::cli::Commands;
use crate::cluster::ContentCluster;
use crate::communicator::{LoopbackTransport, TokioCommunicator};
use crate::config::FleetcastConfig;
use crate::control_loop::ControlLoop;
use crate::database::MemoryCoordinationStore;
use crate::state::{ClusterState, ClusterStateBundle, NodeState};
use crate::timer::{SystemTimer, Timer};
use crate::types::{Node, NodeType, State};

/// Install the global tracing subscriber. `RUST_LOG` wins unless `debug`
/// is set.
pub fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Execute a CLI command
pub async fn execute_command(command: Commands, verbose: bool) -> anyhow::Result<()> {
    match command {
        Commands::Simulate {
            config,
            nodes,
            ticks,
            state_version,
            state,
            deferred_activation,
            partitioned_distributor,
            json,
        } => {
            let mut config = match config {
                Some(path) => FleetcastConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => FleetcastConfig::default(),
            };
            if let Some(count) = nodes {
                config.cluster.flat_node_count = count;
                config.cluster.nodes.clear();
            }
            let options = SimulationOptions {
                ticks,
                version: state_version,
                state,
                deferred_activation,
                partitioned_distributor,
                verbose,
            };
            let status = simulate(&config, &options).await?;
            print_status(&status, json)
        }
        Commands::ParseState { state, json } => {
            let parsed = ClusterState::parse(&state)?;
            if json {
                let out = json!({
                    "canonical": parsed.to_string(),
                    "version": parsed.version(),
                    "distributors": parsed.node_count(NodeType::Distributor),
                    "storage": parsed.node_count(NodeType::Storage),
                    "cluster_up": parsed.is_cluster_up(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", parsed);
            }
            Ok(())
        }
    }
}

/// Parameters for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub ticks: u64,
    pub version: u32,
    pub state: Option<String>,
    pub deferred_activation: bool,
    pub partitioned_distributor: Option<u16>,
    pub verbose: bool,
}

/// Publish one bundle to an in-process cluster and tick until it converges
/// or the tick budget runs out
pub async fn simulate(config: &FleetcastConfig, options: &SimulationOptions) -> anyhow::Result<BroadcastStatus> {
    let timer: Arc<dyn Timer> = Arc::new(SystemTimer);
    let mut cluster = config.cluster.build_cluster();
    cluster.bring_entire_cluster_up(timer.current_time_ms());
    if let Some(index) = options.partitioned_distributor {
        simulate_silent_partition(&mut cluster, index, timer.current_time_ms())?;
    }

    let baseline = match &options.state {
        Some(text) => ClusterState::parse(text)?,
        None => all_up_state(&cluster),
    };
    let bundle = Arc::new(
        ClusterStateBundle::builder(baseline)
            .version(options.version)
            .deferred_activation(options.deferred_activation)
            .build(),
    );

    let transport = Arc::new(LoopbackTransport::new());
    let communicator = TokioCommunicator::new(
        Arc::clone(&transport),
        Handle::current(),
        config.control_loop.request_timeout(),
    );
    let store = MemoryCoordinationStore::new(config.cluster.configured_nodes());
    let converged: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let converged_sink = Arc::clone(&converged);
    let listener = move |bundle: &Arc<ClusterStateBundle>| converged_sink.lock().push(bundle.version());

    let mut control_loop = ControlLoop::new(
        cluster,
        communicator,
        store,
        listener,
        timer,
        config.broadcaster.clone(),
        config.control_loop.clone(),
    );
    control_loop.submit_bundle(Arc::clone(&bundle));

    for _ in 0..options.ticks {
        let outcome = control_loop.tick();
        if options.verbose {
            println!(
                "{} tick {:>3}: sent {} activations {} acked {} failed {}",
                "»".cyan(),
                control_loop.ticks(),
                outcome.state_requests_sent,
                outcome.activations_sent,
                outcome.replies.acked,
                outcome.replies.failed
            );
        }
        if outcome.converged.is_some() {
            break;
        }
        tokio::time::sleep(config.control_loop.tick_interval()).await;
    }

    if options.verbose {
        for info in control_loop.cluster().node_infos() {
            let received = transport.received_bundles(info.node());
            let last = received.last().map(|b| b.baseline().to_string()).unwrap_or_else(|| "-".to_string());
            println!("  {:<14} {}", info.node().to_string().bold(), last);
        }
        println!("  listener notified for versions {:?}", converged.lock());
    }

    Ok(control_loop.status_handle().snapshot())
}

fn all_up_state(cluster: &ContentCluster) -> ClusterState {
    let mut state = ClusterState::new();
    for info in cluster.node_infos() {
        state.set_node_state(info.node(), NodeState::new(State::Up));
    }
    state
}

/// Give storage nodes startup timestamps and make distributor `index` go
/// down and up again with its original timestamp
fn simulate_silent_partition(cluster: &mut ContentCluster, index: u16, now_ms: u64) -> anyhow::Result<()> {
    let storage: Vec<Node> = cluster.storage_nodes().map(|info| info.node()).collect();
    for (offset, node) in storage.into_iter().enumerate() {
        if let Some(info) = cluster.node_info_mut(node) {
            info.set_start_timestamp(now_ms.saturating_sub(1_000) + offset as u64);
        }
    }
    let Some(distributor) = cluster.node_info_mut(Node::distributor(index)) else {
        bail!("no distributor with index {}", index);
    };
    let started = now_ms.saturating_sub(5_000);
    distributor.set_start_timestamp(started);
    distributor.set_reported_state(NodeState::new(State::Up).with_start_timestamp(started), now_ms.saturating_sub(3_000));
    distributor.set_reported_state(NodeState::new(State::Down).with_start_timestamp(started), now_ms.saturating_sub(2_000));
    distributor.set_reported_state(NodeState::new(State::Up).with_start_timestamp(started), now_ms.saturating_sub(1_000));
    Ok(())
}

fn print_status(status: &BroadcastStatus, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let out = json!({
            "phase": status.phase.to_string(),
            "current_version": status.current_bundle.as_ref().map(|b| b.version()),
            "converged_version": status.last_converged.as_ref().map(|b| b.version()),
            "baseline": status.current_bundle.as_ref().map(|b| b.baseline().to_string()),
            "pending_state_acks": status.pending_state_acks,
            "pending_activation_acks": status.pending_activation_acks,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let phase = status.phase.to_string();
    match &status.last_converged {
        Some(bundle) => println!(
            "{} version {} converged ({})",
            "✓".bright_green().bold(),
            bundle.version(),
            bundle.baseline()
        ),
        None => println!(
            "{} not converged: phase {}, {} state acks and {} activation acks outstanding",
            "✗".bright_red().bold(),
            phase.yellow(),
            status.pending_state_acks,
            status.pending_activation_acks
        ),
    }
    Ok(())
}
