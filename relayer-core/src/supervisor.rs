//! Supervisor (spec.md §4.4): owns the two ingestors and every periodic
//! task, and coordinates graceful shutdown. Shaped after the teacher's
//! node-lifecycle split between a long-running service and a shutdown
//! coordinator that signals every task to stop before the process exits.

use crate::chain::ChainAdapter;
use crate::config::ServiceConfig;
use crate::ingestor::{self, Cursor};
use crate::resolver::Resolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle used to request a graceful shutdown and wait for every
/// supervised task to finish.
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

pub struct Supervisor {
    resolver: Arc<Resolver>,
    config: ServiceConfig,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        config: ServiceConfig,
        chain_a: Arc<dyn ChainAdapter>,
        chain_b: Arc<dyn ChainAdapter>,
        cursor_db: sled::Db,
    ) -> Result<Self, sled::Error> {
        let mut adapters = std::collections::HashMap::new();
        adapters.insert(chain_a.chain_id(), chain_a.clone());
        adapters.insert(chain_b.chain_id(), chain_b.clone());
        let resolver = Arc::new(Resolver::new(config.clone(), adapters));

        let (shutdown_tx, _) = watch::channel(false);
        let cursor_a = Cursor::open(&cursor_db, "chain_a")?;
        let cursor_b = Cursor::open(&cursor_db, "chain_b")?;

        let mut tasks = Vec::new();
        tasks.push(spawn_fee_refresh(
            chain_a.clone(),
            Duration::from_secs(config.fee_refresh_interval_secs),
            shutdown_tx.subscribe(),
        ));
        tasks.push(spawn_fee_refresh(
            chain_b.clone(),
            Duration::from_secs(config.fee_refresh_interval_secs),
            shutdown_tx.subscribe(),
        ));
        tasks.push(spawn_ingestor(
            chain_a,
            resolver.clone(),
            cursor_a,
            &config,
            shutdown_tx.subscribe(),
        ));
        tasks.push(spawn_ingestor(
            chain_b,
            resolver.clone(),
            cursor_b,
            &config,
            shutdown_tx.subscribe(),
        ));
        tasks.push(spawn_periodic(
            "timeout_sweep",
            Duration::from_secs(config.timeout_sweep_interval_secs),
            resolver.clone(),
            shutdown_tx.subscribe(),
            |r| Box::pin(async move { r.run_timeout_sweep().await }),
        ));
        tasks.push(spawn_periodic(
            "reconciliation",
            Duration::from_secs(config.reconciliation_interval_secs),
            resolver.clone(),
            shutdown_tx.subscribe(),
            |r| Box::pin(async move { r.run_reconciliation().await }),
        ));

        Ok(Self {
            resolver,
            config,
            tasks,
            shutdown_tx,
        })
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown_tx.clone(),
        }
    }

    /// Blocks until `ctrl_c` or an explicit trigger, then waits for every
    /// supervised task to observe the signal and exit.
    pub async fn run_until_shutdown(mut self) {
        let mut triggered = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
            }
            _ = triggered.changed() => {
                info!("shutdown requested externally");
            }
        }
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "supervised task panicked during shutdown");
            }
        }
        info!("shutdown complete");
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

fn spawn_ingestor(
    adapter: Arc<dyn ChainAdapter>,
    resolver: Arc<Resolver>,
    cursor: Cursor,
    config: &ServiceConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let confirmation_depth = config.confirmation_depth;
    let max_blocks_per_query = config.max_blocks_per_query;
    let polling_interval = config.polling_interval();
    tokio::spawn(async move {
        ingestor::run(
            adapter,
            resolver,
            cursor,
            confirmation_depth,
            max_blocks_per_query,
            polling_interval,
            shutdown,
        )
        .await
    })
}

fn spawn_fee_refresh(
    adapter: Arc<dyn ChainAdapter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let chain = adapter.chain_id();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = adapter.current_fee_quote().await {
                        tracing::warn!(%chain, error = %err, "fee quote refresh failed, keeping stale value");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(%chain, "fee refresh task shutting down");
                        return;
                    }
                }
            }
        }
    })
}

fn spawn_periodic<F>(
    name: &'static str,
    interval: Duration,
    resolver: Arc<Resolver>,
    mut shutdown: watch::Receiver<bool>,
    run_once: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Resolver>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync
        + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_once(resolver.clone()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(task = name, "periodic task shutting down");
                        return;
                    }
                }
            }
        }
    })
}
