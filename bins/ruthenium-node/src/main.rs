//! Ruthenium node binary.
//!
//! Loads the node settings, optionally starts extra follower nodes in the
//! same process as its neighbors, then closes and verifies blocks until
//! Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use ruthenium_core::types::Address;
use ruthenium_node_lib::{LogFormat, Node, NodeSettings};

/// Ruthenium validator node.
#[derive(Parser, Debug)]
#[command(name = "ruthenium-node", version, about = "Ruthenium validator node")]
struct Args {
    /// Settings file (TOML or JSON). Defaults to the platform configuration directory.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Address rewarded for closed blocks. Without one the node only verifies.
    #[arg(long)]
    validator_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Follower nodes to run in this process on the next ports, connected to this node.
    #[arg(long, default_value_t = 0)]
    local_followers: u16,
}

impl Args {
    /// Apply the command line on top of the loaded settings.
    fn into_settings(self) -> anyhow::Result<(NodeSettings, u16)> {
        let mut settings = NodeSettings::load(self.settings.as_deref()).context("failed to load settings")?;
        if let Some(address) = self.validator_address {
            settings.validator.address = Some(Address::new(address));
        }
        if let Some(level) = self.log_level {
            settings.log.level = level;
        }
        if let Some(format) = self.log_format {
            settings.log.format = format;
        }
        Ok((settings, self.local_followers))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (settings, local_followers) = Args::parse().into_settings()?;

    init_logging(&settings.log.level, settings.log.format);

    info!("Ruthenium Node v{}", env!("CARGO_PKG_VERSION"));
    info!("host: {}", settings.host_target());
    match &settings.validator.address {
        Some(address) => info!("validator address: {address}"),
        None => info!("no validator address, blocks are verified only"),
    }

    let node = Node::new(settings.clone()).context("failed to start node")?;
    let (stop, _) = tokio::sync::watch::channel(false);
    let mut followers = tokio::task::JoinSet::new();
    for index in 1..=local_followers {
        let mut follower_settings = settings.clone();
        follower_settings.host.port = settings.host.port.saturating_add(index);
        follower_settings.validator.address = None;
        let follower = Arc::new(Node::new(follower_settings).context("failed to start follower node")?);
        follower.connect(&node);
        node.connect(&follower);
        let mut stopped = stop.subscribe();
        followers.spawn(async move {
            follower
                .run(async move {
                    let _ = stopped.wait_for(|stopped| *stopped).await;
                })
                .await;
        });
    }

    info!("Ruthenium node running (Ctrl+C to stop)");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down...");
    };
    node.run(shutdown).await;

    stop.send_replace(true);
    while followers.join_next().await.is_some() {}

    info!(height = node.blockchain().height(), "Ruthenium node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str` when set.
fn init_logging(level_str: &str, format: LogFormat) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init(),
    }
}
