//! Event ingestor (spec.md §4.2): polls one chain adapter on a timer,
//! advances a crash-safe cursor, and hands normalized events to the
//! resolver at-least-once.

use crate::chain::ChainAdapter;
use crate::resolver::Resolver;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Persists the last-ingested height per chain so a restart resumes instead
/// of re-scanning from genesis or, worse, silently skipping ahead.
pub struct Cursor {
    tree: sled::Tree,
    key: &'static str,
}

impl Cursor {
    pub fn open(db: &sled::Db, chain_name: &'static str) -> Result<Self, sled::Error> {
        let tree = db.open_tree("ingestor_cursors")?;
        Ok(Self {
            tree,
            key: chain_name,
        })
    }

    pub fn get(&self) -> Option<u64> {
        self.tree
            .get(self.key)
            .ok()
            .flatten()
            .and_then(|v| v.as_ref().try_into().ok())
            .map(u64::from_be_bytes)
    }

    pub fn set(&self, height: u64) -> Result<(), sled::Error> {
        self.tree.insert(self.key, &height.to_be_bytes())?;
        self.tree.flush()?;
        Ok(())
    }
}

/// Runs the polling loop until `shutdown` fires. Cold start seeds the
/// cursor at `confirmedHeight - 100` (spec.md §4.2) rather than genesis, so
/// a fresh deployment doesn't replay the chain's entire history.
pub async fn run(
    adapter: Arc<dyn ChainAdapter>,
    resolver: Arc<Resolver>,
    cursor: Cursor,
    confirmation_depth: u64,
    max_blocks_per_query: u64,
    polling_interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let chain = adapter.chain_id();

    loop {
        if *shutdown.borrow() {
            info!(%chain, "ingestor shutting down");
            return;
        }

        let jitter = jittered(polling_interval);
        tokio::select! {
            _ = tokio::time::sleep(jitter) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(%chain, "ingestor shutting down");
                    return;
                }
            }
        }

        let confirmed = match adapter.confirmed_height(confirmation_depth).await {
            Ok(h) => h,
            Err(err) => {
                warn!(%chain, error = %err, "failed to read confirmed height, will retry next tick");
                continue;
            }
        };

        let from = match cursor.get() {
            Some(last) => last + 1,
            None => {
                let seed = confirmed.saturating_sub(100);
                info!(%chain, seed, "cold start, seeding cursor");
                seed
            }
        };

        if from > confirmed {
            continue;
        }

        let to = (from + max_blocks_per_query - 1).min(confirmed);

        match adapter.query_events(from, to, max_blocks_per_query).await {
            Ok(events) => {
                for event in events {
                    resolver.on_event(event).await;
                }
                if let Err(err) = cursor.set(to) {
                    error!(%chain, error = %err, "failed to persist cursor, events may replay on restart");
                }
            }
            Err(err) => {
                warn!(%chain, error = %err, from, to, "query_events failed, will retry next tick");
            }
        }
    }
}

/// ±10% jitter on the polling interval, avoiding synchronized polling
/// across both chain adapters (spec.md §4.2).
fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis() as i64;
    let spread = base_ms / 10;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((base_ms + offset).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_ten_percent() {
        let base = Duration::from_secs(5);
        for _ in 0..100 {
            let j = jittered(base);
            let diff = (j.as_millis() as i64 - base.as_millis() as i64).abs();
            assert!(diff <= base.as_millis() as i64 / 10);
        }
    }
}
