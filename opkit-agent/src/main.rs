//! opkit-agent: example controller built on the opkit reconcile engine.
//!
//! Seeds an in-memory store with Release resources, then:
//! - Watches the store for spec changes (generation-filtered)
//! - Runs one reconcile pass at a time through the operation engine
//! - Requeues passes as the operations ask, backing off on errors
//! - Prints the final release statuses on shutdown
//! - Optionally writes Prometheus metrics to a file on shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use opkit::{BackoffConfig, InMemoryClient};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod agent;
mod metrics;
mod reconciler;
mod release;

use agent::{AgentConfig, ReleaseAgent};
use release::Release;

/// opkit Release agent
#[derive(Parser, Debug)]
#[command(name = "opkit-agent", version, about)]
struct Args {
    /// Number of releases to seed the store with
    #[arg(long, default_value = "3")]
    releases: usize,

    /// Namespace for seeded releases
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Version to roll out
    #[arg(long, default_value = "1.0.0")]
    release_version: String,

    /// Replicas per release
    #[arg(long, default_value = "3")]
    replicas: u32,

    /// Simulated rollout duration in seconds
    #[arg(long, default_value = "5")]
    rollout_secs: u64,

    /// Backoff after the first failed pass, in milliseconds
    #[arg(long, default_value = "500")]
    backoff_base_ms: u64,

    /// Maximum backoff in seconds
    #[arg(long, default_value = "60")]
    backoff_max_secs: u64,

    /// Resync interval in seconds
    #[arg(long, default_value = "300")]
    resync_secs: u64,

    /// Exit once no reconcile pass is pending
    #[arg(long)]
    exit_when_idle: bool,

    /// Write Prometheus metrics to this file on shutdown
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opkit=info,opkit_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = Arc::new(InMemoryClient::new());
    for i in 0..args.releases {
        let name = format!("release-{}", i);
        store
            .create(Release::new(
                &args.namespace,
                &name,
                &args.release_version,
                args.replicas,
            ))
            .await
            .with_context(|| format!("Failed to seed release {}", name))?;
    }
    info!(
        "Seeded {} releases of version {}",
        args.releases, args.release_version
    );

    let config = AgentConfig {
        rollout_duration: Duration::from_secs(args.rollout_secs),
        backoff: BackoffConfig {
            base: Duration::from_millis(args.backoff_base_ms),
            max: Duration::from_secs(args.backoff_max_secs),
        },
        resync_interval: Duration::from_secs(args.resync_secs),
        exit_when_idle: args.exit_when_idle,
    };

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        let _ = shutdown_tx.send(true);
        // Keep the sender alive until the agent has observed the signal.
        shutdown_tx.closed().await;
    });

    let mut agent =
        ReleaseAgent::new(store.clone(), config).context("Failed to create release agent")?;
    agent.run(shutdown_rx).await?;

    if let Some(path) = &args.metrics_file {
        tokio::fs::write(path, agent.metrics().encode_text()?)
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!("Wrote metrics to {}", path.display());
    }

    for release in store.list().await {
        println!(
            "{}",
            serde_json::to_string_pretty(&release).context("Failed to encode release")?
        );
    }

    info!("Shutdown complete");
    Ok(())
}
