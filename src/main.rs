/// poolscale - node pool scaling adapter
///
/// Operator CLI around the adapter the autoscaling loop uses: inspect the
/// node groups of a cluster and drive the same resize and delete operations
/// by hand.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poolscale::cloudprovider::{CloudProvider, Node, NodeGroup, NodePoolCloudProvider, ResourceLimiter};
use poolscale::config::Config;
use poolscale::nodepool::{PoolNodeGroup, NODE_POOL_LABEL};

#[derive(Parser)]
#[command(name = "poolscale")]
#[command(about = "Scale the node pools of a managed Kubernetes cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (settings missing from it are read from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    Init {
        /// Where to write the file
        #[arg(default_value = "poolscale.yaml")]
        path: PathBuf,
    },

    /// Show the node groups of the cluster
    Status,

    /// Grow a node pool
    ScaleUp {
        /// Node pool name
        pool: String,
        /// Number of nodes to add
        delta: i64,
    },

    /// Shrink the target size of a node pool
    ScaleDown {
        /// Node pool name
        pool: String,
        /// Number of nodes to remove
        delta: i64,
    },

    /// Delete specific nodes of a node pool
    DeleteNodes {
        /// Node pool name
        pool: String,
        /// Node names
        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// List machine types usable for node pools
    MachineTypes,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("poolscale={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute command
    let result = match &cli.command {
        Commands::Init { path } => init_config(path).await,
        Commands::Status => show_status(&cli).await,
        Commands::ScaleUp { pool, delta } => scale_up(&cli, pool, *delta).await,
        Commands::ScaleDown { pool, delta } => scale_down(&cli, pool, *delta).await,
        Commands::DeleteNodes { pool, nodes } => delete_nodes(&cli, pool, nodes).await,
        Commands::MachineTypes => machine_types(&cli).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration and build the provider
async fn provider(cli: &Cli) -> Result<NodePoolCloudProvider> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    info!("Cluster name: {}", config.cluster_name);

    poolscale::cloudprovider::build(&config, ResourceLimiter::default())
        .await
        .context("Failed to load node pools")
}

fn find_group(provider: &NodePoolCloudProvider, pool: &str) -> Result<Arc<PoolNodeGroup>> {
    provider.manager().node_group(pool).with_context(|| {
        format!(
            "No node pool {} in cluster {}",
            pool,
            provider.manager().cluster_name()
        )
    })
}

/// Initialize example configuration file
async fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Configuration file already exists: {}", path.display());
    }

    let yaml = serde_yaml::to_string(&Config::example())?;

    tokio::fs::write(path, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", path.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the configuration file to match your cluster");
    info!("  2. Provide credentials, e.g.:");
    info!("     export OS_PASSWORD=your-password");
    info!("  3. Inspect the node pools:");
    info!("     poolscale -c {} status", path.display());

    Ok(())
}

/// Show the node groups of the cluster
async fn show_status(cli: &Cli) -> Result<()> {
    let provider = provider(cli).await?;
    let groups = provider.node_groups();

    if groups.is_empty() {
        info!(
            "No node pools found for cluster: {}",
            provider.manager().cluster_name()
        );
        return Ok(());
    }

    info!("Cluster: {}", provider.manager().cluster_name());
    info!("");
    info!("Node pools:");
    for pool in provider.manager().snapshot() {
        info!(
            "  - {} (size: {}, flavor: {})",
            pool.name,
            pool.size,
            pool.flavor.as_deref().unwrap_or("N/A")
        );
    }

    Ok(())
}

/// Grow a node pool
async fn scale_up(cli: &Cli, pool: &str, delta: i64) -> Result<()> {
    let provider = provider(cli).await?;
    let group = find_group(&provider, pool)?;

    group
        .increase_size(delta)
        .await
        .with_context(|| format!("Failed to scale up node pool {}", pool))?;

    info!("✓ Node pool {} scaling up by {}", pool, delta);
    Ok(())
}

/// Shrink the target size of a node pool
async fn scale_down(cli: &Cli, pool: &str, delta: i64) -> Result<()> {
    let provider = provider(cli).await?;
    let group = find_group(&provider, pool)?;

    group
        .decrease_target_size(-delta)
        .await
        .with_context(|| format!("Failed to scale down node pool {}", pool))?;

    info!("✓ Node pool {} scaling down by {}", pool, delta);
    Ok(())
}

/// Delete specific nodes of a node pool
async fn delete_nodes(cli: &Cli, pool: &str, nodes: &[String]) -> Result<()> {
    let provider = provider(cli).await?;
    let group = find_group(&provider, pool)?;

    let nodes: Vec<Node> = nodes
        .iter()
        .map(|name| Node::new(name.as_str()).with_label(NODE_POOL_LABEL, pool))
        .collect();

    let outcomes = group.delete_nodes(&nodes).await;
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();

    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => info!("  ✓ {}", outcome.node),
            Err(e) => warn!("  ✗ {}: {}", outcome.node, e),
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} nodes could not be deleted", failed, outcomes.len());
    }

    info!("✓ Deleted {} nodes from node pool {}", outcomes.len(), pool);
    Ok(())
}

/// List machine types usable for node pools
async fn machine_types(cli: &Cli) -> Result<()> {
    let provider = provider(cli).await?;
    let types = provider
        .get_available_machine_types()
        .await
        .context("Failed to list machine types")?;

    info!("Machine types:");
    for machine_type in types {
        info!("  - {}", machine_type);
    }

    Ok(())
}
