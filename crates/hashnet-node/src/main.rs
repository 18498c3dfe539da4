//! hashnet daemon
//!
//! `hashnetd start` registers the machine and runs the order controller and
//! heartbeat until interrupted. `hashnetd stop` takes the machine off the
//! marketplace.

use clap::{Parser, Subcommand};
use hashnet_node::{build_context, shutdown_signal, Node, NodeConfig, NodeError, NodeResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hashnet host daemon CLI
#[derive(Parser)]
#[command(name = "hashnetd")]
#[command(about = "hashnet - Host daemon for the compute-rental marketplace", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HASHNET_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "HASHNET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "HASHNET_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the machine and serve rental orders
    Start,
    /// Remove the machine from the marketplace and clear local state
    Stop,
}

#[tokio::main]
async fn main() -> NodeResult<()> {
    let cli = Cli::parse();

    let config = NodeConfig::load(cli.config.as_deref())
        .map_err(|e| NodeError::Config(e.to_string()))?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let node = Node::new(build_context(config).await?);

    match cli.command {
        Command::Start => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting hashnet node");
            node.run_until(shutdown_signal()).await
        }
        Command::Stop => node.decommission().await,
    }
}
