use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framectl::client::HttpPeer;
use framectl::config::Config;
use framectl::control::{
    ControllerRegistry, FallbackRouter, FrameHandlerAdapter, RankAssigner,
    SharedController, SharedPeer,
};
use framectl::metrics;

#[derive(Parser)]
#[command(
    name = "framectl",
    version,
    about = "Rank assignment and parameter control for frame handler pools",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the peer to become ready, assign ranks, then serve until Ctrl-C
    Run {
        /// Exit as soon as rank assignment settles
        #[arg(long, default_value = "false")]
        exit_after_assign: bool,
    },

    /// Read a parameter, falling back to the local controller
    Get {
        /// Parameter path
        path: String,

        /// Include type and writability metadata
        #[arg(short, long, default_value = "false")]
        metadata: bool,
    },

    /// Write a JSON value to a parameter, falling back to the local controller
    Put {
        /// Parameter path
        path: String,

        /// JSON value
        value: String,
    },

    /// Assign ranks once without waiting for peer readiness
    Assign,

    /// Print the metric families registered by this binary
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!(name = %config.controller.name, "framectl starting");

    match cli.command {
        Commands::Run { exit_after_assign } => run(&config, exit_after_assign).await?,
        Commands::Get { path, metadata } => get(&config, &path, metadata).await?,
        Commands::Put { path, value } => put(&config, &path, &value).await?,
        Commands::Assign => assign(&config).await?,
        Commands::Metrics => print_metrics()?,
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("framectl=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("framectl={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Peer and worker endpoints described by the config
fn connect_peers(config: &Config) -> Result<(SharedPeer, SharedController)> {
    let peer: SharedPeer = Arc::new(
        HttpPeer::new(&config.controller.peer_adapter, config.peers.client_config())
            .context("Failed to create peer client")?,
    );

    let workers: SharedController = if config.peers.has_separate_workers() {
        Arc::new(
            HttpPeer::new("workers", config.peers.workers_client_config())
                .context("Failed to create worker client")?,
        )
    } else {
        Arc::clone(&peer).as_controller()
    };

    Ok((peer, workers))
}

async fn run(config: &Config, exit_after_assign: bool) -> Result<()> {
    let mut adapter = FrameHandlerAdapter::from_config(&config.controller, &ControllerRegistry::default())
        .context("Failed to build controller")?;
    let (peer, workers) = connect_peers(config)?;
    adapter.connect(peer, workers)?;

    let controller = Arc::clone(adapter.controller());
    let settled = async {
        if exit_after_assign {
            controller.wait_settled().await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        state = settled => {
            tracing::info!(state = %state, "Rank assignment settled");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested");
        }
    }

    adapter.cleanup().await;
    print_json(&adapter.status())
}

async fn get(config: &Config, path: &str, metadata: bool) -> Result<()> {
    let router = local_router(config)?;
    let routed = router
        .read(path, metadata)
        .await
        .with_context(|| format!("GET {path} failed"))?;

    tracing::debug!(path, backend = routed.source.as_str(), "Read served");
    print_json(&routed.value)
}

async fn put(config: &Config, path: &str, raw: &str) -> Result<()> {
    let value: Value = serde_json::from_str(raw).context("Value must be valid JSON")?;
    let router = local_router(config)?;
    let routed = router
        .write(path, value)
        .await
        .with_context(|| format!("PUT {path} failed"))?;

    tracing::info!(path, backend = routed.source.as_str(), "Write accepted");
    Ok(())
}

/// Router from the remote peer to a fresh local controller
fn local_router(config: &Config) -> Result<FallbackRouter> {
    let (peer, _) = connect_peers(config)?;
    let local: SharedController = Arc::new(
        ControllerRegistry::default()
            .build(&config.controller)
            .context("Failed to build controller")?,
    );
    Ok(FallbackRouter::new(peer.as_controller(), local))
}

async fn assign(config: &Config) -> Result<()> {
    let (peer, workers) = connect_peers(config)?;
    let assigner = RankAssigner::new(config.controller.failure_policy)
        .with_count_path(config.controller.count_path.clone());

    let report = assigner
        .assign(peer.as_ref(), workers.as_ref())
        .await
        .context("Rank assignment failed")?;

    print_json(&report)?;
    if !report.is_complete() {
        anyhow::bail!(
            "rank assignment {}: {} of {} workers assigned",
            report.result_label(),
            report.assigned.len(),
            report.process_count
        );
    }
    Ok(())
}

fn print_metrics() -> Result<()> {
    let text = metrics::encode_metrics().map_err(|e| anyhow::anyhow!("{e}"))?;
    print!("{text}");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
