use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use fleet_core::AgentConfig;
use fleet_metrics::Registry;
use fleetd::{AgentInfo, build_router, spawn_reconcilers};

#[derive(Parser)]
#[command(name = "fleetd", about = "Managed-instance telemetry agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover instances and serve their metrics until interrupted.
    Run {
        /// Path to the agent configuration file.
        #[arg(long, short)]
        config: PathBuf,

        /// Cloud region; overrides the config file.
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,

        /// Address to serve `/metrics` on; overrides the config file.
        #[arg(long, env = "LISTEN_ADDRESS")]
        listen_address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleet=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            region,
            listen_address,
        } => run(config, region, listen_address).await,
    }
}

async fn run(config_path: PathBuf, region: Option<String>, listen_address: Option<String>) -> anyhow::Result<()> {
    let mut config = AgentConfig::from_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if region.is_some() {
        config.region = region;
    }
    if listen_address.is_some() {
        config.listen_address = listen_address;
    }
    let settings = config.into_settings().context("invalid configuration")?;

    let version = env!("CARGO_PKG_VERSION");
    info!(
        version,
        region = %settings.region,
        database = settings.database.is_some(),
        cache = settings.cache.is_some(),
        "fleetd starting"
    );

    let registry = Registry::new();
    registry.register_unscoped(Arc::new(AgentInfo::new(version))).await;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconcilers = spawn_reconcilers(&settings, &registry, &shutdown_rx);

    // ── Metrics endpoint ───────────────────────────────────────

    let router = build_router(registry);
    let listener = tokio::net::TcpListener::bind(settings.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_address))?;
    info!(addr = %settings.listen_address, "serving /metrics");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in reconcilers {
        let _ = handle.await;
    }

    info!("fleetd stopped");
    Ok(())
}
