use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{from_yaml_documents, CoreError, Node, Pod, ResourceEvent, ResourceKey};
use tether_scheduler::binder::{MockVolumeBinder, VolumeBinder};
use tether_scheduler::framework::{EventBusConfig, FrameworkHandle};
use tether_scheduler::volumebinding::{self, VolumeBindingArgs};
use tether_scheduler::{Scheduler, SchedulerConfiguration};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "tether", about = "Volume-aware pod scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scheduler configuration and print the effective settings
    CheckConfig {
        /// Path to the scheduler configuration file
        #[arg(long, env = "TETHER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Schedule the pods of a manifest onto its nodes with an in-memory volume binder
    Schedule {
        /// Path to the scheduler configuration file
        #[arg(long, env = "TETHER_CONFIG")]
        config: Option<PathBuf>,
        /// Multi-document YAML file with Node and Pod objects
        #[arg(long)]
        manifest: PathBuf,
        /// Capacity of the event bus
        #[arg(long, default_value_t = EventBusConfig::default().capacity)]
        event_bus_capacity: usize,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { config } => run_check_config(config),
        Commands::Schedule {
            config,
            manifest,
            event_bus_capacity,
        } => run_schedule(config, &manifest, event_bus_capacity).await,
    }
}

/// Validate the VolumeBinding arguments of a configuration
fn run_check_config(config: Option<PathBuf>) -> miette::Result<()> {
    let config = load_config(config)?;
    let args = VolumeBindingArgs::decode(&config.plugin_args(volumebinding::NAME))?;
    args.validate()?;

    println!(
        "{}: bindTimeoutSeconds={}",
        volumebinding::NAME,
        args.bind_timeout().as_secs()
    );
    Ok(())
}

/// Schedule every pod of the manifest, then report them deleted
async fn run_schedule(
    config: Option<PathBuf>,
    manifest: &Path,
    event_bus_capacity: usize,
) -> miette::Result<()> {
    let config = load_config(config)?;
    let (nodes, pods) = load_manifest(manifest)?;
    info!(
        "Loaded {} node(s) and {} pod(s) from {}",
        nodes.len(),
        pods.len(),
        manifest.display()
    );

    let handle = FrameworkHandle::with_event_bus_config(
        EventBusConfig {
            capacity: event_bus_capacity,
        },
        Arc::new(|bind_timeout: Duration| {
            Arc::new(MockVolumeBinder::new(bind_timeout)) as Arc<dyn VolumeBinder>
        }),
    )?;
    let scheduler = Scheduler::from_config(&config, &handle)?;

    let mut scheduled = 0;
    for pod in &pods {
        match scheduler.schedule_pod(pod, &nodes).await {
            Ok(outcome) => {
                scheduled += 1;
                println!("{}\t{}", tether_core::pod_key(pod), outcome.node_name);
            }
            Err(e) => {
                error!("Failed to schedule pod {}: {}", tether_core::pod_key(pod), e);
                println!("{}\t<unschedulable>", tether_core::pod_key(pod));
            }
        }
    }

    // Pods are gone once the run ends; let the deletion listener clean up
    let events = handle.event_sender();
    for pod in &pods {
        let object = tether_core::to_json_value(pod)?;
        let event = ResourceEvent::deleted(ResourceKey::for_pod(pod), object, String::new());
        if events.send(event).is_err() {
            warn!("No subscribers for deletion of pod {}", tether_core::pod_key(pod));
        }
    }
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while !events.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Deletion events still queued at shutdown");
    }
    handle.shutdown();

    info!("Scheduled {} of {} pod(s)", scheduled, pods.len());
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> miette::Result<SchedulerConfiguration> {
    match path {
        Some(path) => {
            info!("Loading scheduler configuration from {}", path.display());
            Ok(SchedulerConfiguration::from_file(&path)?)
        }
        None => Ok(SchedulerConfiguration::default()),
    }
}

/// Split a manifest into its nodes and pods
fn load_manifest(path: &Path) -> miette::Result<(Vec<Node>, Vec<Pod>)> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read manifest '{}': {}", path.display(), e))?;

    let mut nodes = Vec::new();
    let mut pods = Vec::new();
    for doc in from_yaml_documents(&data)? {
        let kind = doc
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "Node" => nodes.push(from_value(doc)?),
            "Pod" => pods.push(from_value(doc)?),
            other => {
                return Err(CoreError::invalid_resource(
                    format!("unsupported kind '{}' in manifest", other),
                    "Manifests may only contain Node and Pod objects",
                )
                .into())
            }
        }
    }
    Ok((nodes, pods))
}

fn from_value<T: serde::de::DeserializeOwned>(doc: serde_json::Value) -> miette::Result<T> {
    serde_json::from_value(doc).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to decode manifest object: {}", e),
            Some(Box::new(e)),
        )
        .into()
    })
}
