use clap::{Args, Parser, Subcommand};
use cumulus_core::{InstanceSpec, NodeMetrics, NodeState, NodeView};
use cumulus_scheduler::{
    active_states_filter, inactive_states_filter, NodeConfig, NodeFilter, NodeRegistry,
    RecordMetricsStore, Scheduler, SchedulerConfig,
};
use cumulus_storage::{RecordStore, RedbBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cumulus", about = "Cumulus VM placement")]
struct Cli {
    /// Path to the redb database file
    #[arg(long, env = "CUMULUS_DATA", default_value = "./cumulus.redb", global = true)]
    data: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// This node's identity
#[derive(Args)]
struct NodeArgs {
    /// Fully qualified name of this node
    #[arg(long, env = "NODE_NAME")]
    node_name: String,
    /// Address of this node
    #[arg(long, env = "NODE_IP")]
    node_ip: String,
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        NodeConfig {
            node_name: args.node_name,
            node_ip: args.node_ip,
        }
    }
}

/// Placement limits
#[derive(Args)]
struct SchedulerArgs {
    #[arg(long, env = "CPU_OVERCOMMIT_RATIO", default_value_t = 16.0)]
    cpu_overcommit_ratio: f64,
    #[arg(long, env = "RAM_OVERCOMMIT_RATIO", default_value_t = 1.5)]
    ram_overcommit_ratio: f64,
    /// GiB of memory reserved for the host
    #[arg(long, env = "RAM_SYSTEM_RESERVATION", default_value_t = 5.0)]
    ram_system_reservation: f64,
    /// Seconds a metrics snapshot stays usable
    #[arg(long, env = "SCHEDULER_CACHE_TIMEOUT", default_value_t = 30)]
    scheduler_cache_timeout: u64,
    /// Address of the network node
    #[arg(long, env = "NETWORK_NODE_IP", default_value = "")]
    network_node_ip: String,
    /// Name recorded on audit events
    #[arg(long, env = "NODE_NAME", default_value = "")]
    node_name: String,
}

impl From<SchedulerArgs> for SchedulerConfig {
    fn from(args: SchedulerArgs) -> Self {
        SchedulerConfig {
            cpu_overcommit_ratio: args.cpu_overcommit_ratio,
            ram_overcommit_ratio: args.ram_overcommit_ratio,
            ram_system_reservation_gb: args.ram_system_reservation,
            cache_timeout: Duration::from_secs(args.scheduler_cache_timeout),
            network_node_ip: args.network_node_ip,
            node_name: args.node_name,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register this node, or refresh its observation
    Observe {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// List nodes as JSON
    Nodes {
        /// Only nodes usable for scheduling
        #[arg(long, conflicts_with = "inactive")]
        active: bool,
        /// Only deleted, errored or missing nodes
        #[arg(long)]
        inactive: bool,
    },
    /// Move a node to another lifecycle state
    SetState {
        node: String,
        #[arg(value_parser = parse_state)]
        state: NodeState,
    },
    /// Soft-delete a node
    Delete { node: String },
    /// Publish a node's metrics from a JSON file
    Metrics { node: String, file: String },
    /// Print candidate nodes for an instance
    Place {
        /// Instance description, JSON or YAML
        #[arg(long)]
        spec: String,
        /// Network the instance attaches to (repeatable)
        #[arg(long = "network")]
        networks: Vec<String>,
        /// Restrict placement to these nodes (repeatable)
        #[arg(long = "candidate")]
        candidates: Vec<String>,
        #[command(flatten)]
        scheduler: SchedulerArgs,
    },
    /// Keep this node's observation fresh until interrupted
    Agent {
        #[command(flatten)]
        node: NodeArgs,
        /// Seconds between observations
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}

fn parse_state(s: &str) -> Result<NodeState, String> {
    NodeState::parse(s).ok_or_else(|| {
        let known: Vec<_> = NodeState::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown state '{}', expected one of {}", s, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let store = open_store(&cli.data)?;

    match cli.command {
        Commands::Observe { node } => {
            let config = NodeConfig::from(node);
            let registry = NodeRegistry::new(store, config.node_name.clone());
            let node = registry.observe_this_node(&config)?;
            print_json(&node.external_view())
        }
        Commands::Nodes { active, inactive } => {
            let registry = NodeRegistry::new(store, "");
            let filters: Vec<NodeFilter> = if active {
                vec![active_states_filter]
            } else if inactive {
                vec![inactive_states_filter]
            } else {
                Vec::new()
            };
            let views: Vec<NodeView> = registry
                .enumerate(&filters)
                .iter()?
                .map(|n| n.external_view())
                .collect();
            print_json(&views)
        }
        Commands::SetState { node, state } => {
            let registry = NodeRegistry::new(store, "");
            print_json(&registry.transition(&node, state)?.external_view())
        }
        Commands::Delete { node } => {
            let registry = NodeRegistry::new(store, "");
            print_json(&registry.delete(&node)?.external_view())
        }
        Commands::Metrics { node, file } => {
            let metrics: NodeMetrics = cumulus_core::from_json(&read_file(&file)?)?;
            RecordMetricsStore::new(store).publish_metrics(&node, &metrics)?;
            info!("Published {} metrics for node {}", metrics.iter().count(), node);
            Ok(())
        }
        Commands::Place {
            spec,
            networks,
            candidates,
            scheduler,
        } => run_place(store, &spec, &networks, &candidates, scheduler.into()).await,
        Commands::Agent { node, interval } => {
            run_agent(store, node.into(), Duration::from_secs(interval)).await
        }
    }
}

async fn run_place(
    store: Arc<RecordStore>,
    spec_path: &str,
    networks: &[String],
    candidates: &[String],
    config: SchedulerConfig,
) -> miette::Result<()> {
    let data = read_file(spec_path)?;
    let instance: InstanceSpec = if spec_path.ends_with(".yaml") || spec_path.ends_with(".yml") {
        cumulus_core::from_yaml(&data)?
    } else {
        cumulus_core::from_json(&data)?
    };

    let mut scheduler = Scheduler::new(store, config);
    let forced = (!candidates.is_empty()).then_some(candidates);
    let nodes = scheduler.place(&instance, networks, forced).await?;

    print_json(&nodes)
}

/// Observe this node now and then every `interval` until ctrl-c
async fn run_agent(
    store: Arc<RecordStore>,
    config: NodeConfig,
    interval: Duration,
) -> miette::Result<()> {
    info!("Starting cumulus agent for node '{}'", config.node_name);

    let registry = NodeRegistry::new(store, config.node_name.clone());
    registry.observe_this_node(&config)?;

    let token = CancellationToken::new();
    let loop_token = token.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = loop_token.cancelled() => {
                    info!("Observation loop shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = registry.observe_this_node(&config) {
                        warn!("Observing node failed, will retry: {}", e);
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    if let Err(e) = handle.await {
        error!("Observation loop failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Open the record store at `data`
fn open_store(data: &str) -> miette::Result<Arc<RecordStore>> {
    let backend = RedbBackend::new(Path::new(data))
        .map_err(|e| miette::miette!("Failed to open storage at '{}': {}", data, e))?;
    Ok(Arc::new(RecordStore::new(Arc::new(backend))))
}

fn read_file(path: &str) -> miette::Result<String> {
    std::fs::read_to_string(path).map_err(|e| miette::miette!("Failed to read '{}': {}", path, e))
}

fn print_json<T: serde::Serialize>(value: &T) -> miette::Result<()> {
    println!("{}", cumulus_core::to_json_pretty(value)?);
    Ok(())
}
