//! Resolver binary: loads configuration, builds the two chain adapters,
//! and runs the supervisor until shutdown (spec.md §4.4, §6.2).

mod cli;
mod health;

use anyhow::Context;
use relayer_core::chain::{ChainId, RpcChainAdapter};
use relayer_core::config::ServiceConfig;
use relayer_core::supervisor::Supervisor;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    relayer_core::metrics::init();

    let config = ServiceConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    info!(config_path = %args.config.display(), "configuration loaded");

    let chain_a: Arc<dyn relayer_core::chain::ChainAdapter> = Arc::new(RpcChainAdapter::new(
        ChainId::A,
        config.chain_a.rpc_url.clone(),
        config.retry_attempts,
        Duration::from_secs(config.retry_base_delay_secs),
        config.max_concurrent_submissions,
    ));
    let chain_b: Arc<dyn relayer_core::chain::ChainAdapter> = Arc::new(RpcChainAdapter::new(
        ChainId::B,
        config.chain_b.rpc_url.clone(),
        config.retry_attempts,
        Duration::from_secs(config.retry_base_delay_secs),
        config.max_concurrent_submissions,
    ));

    let cursor_db = sled::open(&args.cursor_db)
        .with_context(|| format!("opening cursor database at {}", args.cursor_db.display()))?;

    let supervisor = Supervisor::new(config, chain_a, chain_b, cursor_db)
        .context("starting supervisor")?;

    let resolver = supervisor.resolver();
    let health_addr = args.health_addr;
    tokio::spawn(async move {
        if let Err(err) = health::serve(health_addr, resolver).await {
            tracing::error!(error = %err, "health server exited");
        }
    });

    supervisor.run_until_shutdown().await;
    Ok(())
}
