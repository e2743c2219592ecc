//! Concrete `ChainAdapter` implementations: a generic JSON-RPC adapter with
//! retry/backoff (spec.md §4.1), and an in-memory mock used by tests.

use super::{Action, ChainAdapter, ChainId, Event, FeeQuote, Receipt, ReceiptStatus};
use crate::error::AdapterError;
use crate::order::HtlcMirror;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Generic JSON-RPC-backed adapter. The wire format of `query_events` /
/// `submit` / receipt polling is deliberately unspecified by spec.md §6.1
/// (ledgers are external collaborators, specified only at their interface);
/// this implementation assumes a minimal JSON-RPC surface and retries
/// transient failures the way `bitcoin_adapter.rs`-style RPC clients do.
pub struct RpcChainAdapter {
    chain: ChainId,
    client: reqwest::Client,
    rpc_url: String,
    retry_attempts: u32,
    retry_base_delay: Duration,
    fee_quote: RwLock<FeeQuote>,
    /// Bounds concurrent in-flight submissions per chain (spec.md §5).
    submission_permits: tokio::sync::Semaphore,
}

#[derive(Deserialize)]
struct TipHeightResponse {
    height: u64,
}

#[derive(Deserialize)]
struct QueryEventsResponse {
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    tx_id: String,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    status: String,
    block_height: u64,
    #[serde(default)]
    logs: Vec<Event>,
}

impl RpcChainAdapter {
    pub fn new(
        chain: ChainId,
        rpc_url: impl Into<String>,
        retry_attempts: u32,
        retry_base_delay: Duration,
        max_concurrent_submissions: u32,
    ) -> Self {
        Self {
            chain,
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            retry_attempts,
            retry_base_delay,
            fee_quote: RwLock::new(FeeQuote {
                base_fee: 0,
                gas_price: 0,
            }),
            submission_permits: tokio::sync::Semaphore::new(max_concurrent_submissions as usize),
        }
    }

    /// Runs `f` with exponential backoff `base · 2^n`, up to
    /// `retry_attempts` tries total, per spec.md §4.1. The last error is
    /// returned as `AdapterError::SubmitExhausted` only by callers that
    /// specifically mean a submission; query-style callers get the raw
    /// error back unchanged.
    async fn with_retry<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < self.retry_attempts => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt);
                    warn!(chain = %self.chain, %op, attempt, ?delay, error = %err, "retrying after transient adapter error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn rpc_error(&self, reason: impl std::fmt::Display) -> AdapterError {
        AdapterError::Rpc {
            chain: self.chain.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ChainAdapter for RpcChainAdapter {
    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn tip_height(&self) -> Result<u64, AdapterError> {
        self.with_retry("tip_height", || async {
            let resp = self
                .client
                .get(format!("{}/tip", self.rpc_url))
                .send()
                .await
                .map_err(|e| self.rpc_error(e))?
                .json::<TipHeightResponse>()
                .await
                .map_err(|e| AdapterError::Decode {
                    height: 0,
                    reason: e.to_string(),
                })?;
            Ok(resp.height)
        })
        .await
    }

    async fn query_events(
        &self,
        from_height: u64,
        to_height: u64,
        max_blocks_per_query: u64,
    ) -> Result<Vec<Event>, AdapterError> {
        let span = to_height.saturating_sub(from_height) + 1;
        if span > max_blocks_per_query {
            return Err(AdapterError::WindowTooLarge {
                requested: span,
                max: max_blocks_per_query,
            });
        }
        self.with_retry("query_events", || async {
            let resp = self
                .client
                .get(format!(
                    "{}/events?from={}&to={}",
                    self.rpc_url, from_height, to_height
                ))
                .send()
                .await
                .map_err(|e| self.rpc_error(e))?
                .json::<QueryEventsResponse>()
                .await
                .map_err(|e| AdapterError::Decode {
                    height: from_height,
                    reason: e.to_string(),
                })?;
            let mut events = resp.events;
            events.sort_by_key(|e| e.order_key());
            Ok(events)
        })
        .await
    }

    async fn submit(&self, action: Action) -> Result<String, AdapterError> {
        let _permit = self
            .submission_permits
            .acquire()
            .await
            .expect("submission semaphore is never closed");
        let result = self
            .with_retry("submit", || async {
                let resp = self
                    .client
                    .post(format!("{}/submit", self.rpc_url))
                    .json(&action)
                    .send()
                    .await
                    .map_err(|e| self.rpc_error(e))?
                    .json::<SubmitResponse>()
                    .await
                    .map_err(|e| self.rpc_error(e))?;
                Ok(resp.tx_id)
            })
            .await;
        result.map_err(|_| AdapterError::SubmitExhausted {
            chain: self.chain.to_string(),
        })
    }

    async fn wait_for_receipt(
        &self,
        tx_id: &str,
        timeout: Duration,
    ) -> Result<Receipt, AdapterError> {
        tokio::time::timeout(timeout, async {
            let resp = self
                .client
                .get(format!("{}/receipt/{}", self.rpc_url, tx_id))
                .send()
                .await
                .map_err(|e| self.rpc_error(e))?
                .json::<ReceiptResponse>()
                .await
                .map_err(|e| self.rpc_error(e))?;
            Ok(Receipt {
                status: if resp.status == "success" {
                    ReceiptStatus::Success
                } else {
                    ReceiptStatus::Failed
                },
                block_height: resp.block_height,
                logs: resp.logs,
            })
        })
        .await
        .map_err(|_| AdapterError::Timeout {
            chain: self.chain.to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        })?
    }

    async fn current_fee_quote(&self) -> Result<FeeQuote, AdapterError> {
        let refreshed = self
            .with_retry("current_fee_quote", || async {
                let resp = self
                    .client
                    .get(format!("{}/fee", self.rpc_url))
                    .send()
                    .await
                    .map_err(|e| self.rpc_error(e))?
                    .json::<FeeQuote>()
                    .await
                    .map_err(|e| self.rpc_error(e))?;
                Ok(resp)
            })
            .await;
        match refreshed {
            Ok(quote) => {
                *self.fee_quote.write().await = quote;
                Ok(quote)
            }
            // Retain prior value on failure, per spec.md §4.1.
            Err(_) => Ok(*self.fee_quote.read().await),
        }
    }

    async fn htlc_view(&self, htlc_id: &str) -> Result<Option<HtlcMirror>, AdapterError> {
        self.with_retry("htlc_view", || async {
            let resp = self
                .client
                .get(format!("{}/htlc/{}", self.rpc_url, htlc_id))
                .send()
                .await
                .map_err(|e| self.rpc_error(e))?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let mirror = resp
                .json::<HtlcMirror>()
                .await
                .map_err(|e| self.rpc_error(e))?;
            Ok(Some(mirror))
        })
        .await
    }
}

/// In-memory adapter for tests: a scripted ledger that accepts submissions
/// and replays events back through `query_events`.
pub struct MockChainAdapter {
    chain: ChainId,
    tip: AtomicU64,
    events: RwLock<Vec<Event>>,
    submitted: RwLock<Vec<Action>>,
    htlcs: RwLock<std::collections::HashMap<String, HtlcMirror>>,
    next_tx_id: AtomicU64,
    fee_quote: FeeQuote,
}

impl MockChainAdapter {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain,
            tip: AtomicU64::new(0),
            events: RwLock::new(Vec::new()),
            submitted: RwLock::new(Vec::new()),
            htlcs: RwLock::new(std::collections::HashMap::new()),
            next_tx_id: AtomicU64::new(1),
            fee_quote: FeeQuote {
                base_fee: 1,
                gas_price: 1,
            },
        }
    }

    pub async fn push_event(&self, event: Event) {
        self.tip.fetch_max(event.block_height, Ordering::SeqCst);
        self.events.write().await.push(event);
    }

    pub fn set_tip(&self, height: u64) {
        self.tip.fetch_max(height, Ordering::SeqCst);
    }

    pub async fn submitted_actions(&self) -> Vec<Action> {
        self.submitted.read().await.clone()
    }

    pub async fn set_htlc(&self, htlc: HtlcMirror) {
        self.htlcs.write().await.insert(htlc.htlc_id.clone(), htlc);
    }

    pub async fn remove_htlc(&self, htlc_id: &str) {
        self.htlcs.write().await.remove(htlc_id);
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    fn chain_id(&self) -> ChainId {
        self.chain
    }

    async fn tip_height(&self) -> Result<u64, AdapterError> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn query_events(
        &self,
        from_height: u64,
        to_height: u64,
        max_blocks_per_query: u64,
    ) -> Result<Vec<Event>, AdapterError> {
        let span = to_height.saturating_sub(from_height) + 1;
        if span > max_blocks_per_query {
            return Err(AdapterError::WindowTooLarge {
                requested: span,
                max: max_blocks_per_query,
            });
        }
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.block_height >= from_height && e.block_height <= to_height)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.order_key());
        Ok(matched)
    }

    async fn submit(&self, action: Action) -> Result<String, AdapterError> {
        let tx_id = format!("mocktx-{}", self.next_tx_id.fetch_add(1, Ordering::SeqCst));
        self.submitted.write().await.push(action);
        Ok(tx_id)
    }

    async fn wait_for_receipt(
        &self,
        _tx_id: &str,
        _timeout: Duration,
    ) -> Result<Receipt, AdapterError> {
        Ok(Receipt {
            status: ReceiptStatus::Success,
            block_height: self.tip.load(Ordering::SeqCst),
            logs: vec![],
        })
    }

    async fn current_fee_quote(&self) -> Result<FeeQuote, AdapterError> {
        Ok(self.fee_quote)
    }

    async fn htlc_view(&self, htlc_id: &str) -> Result<Option<HtlcMirror>, AdapterError> {
        Ok(self.htlcs.read().await.get(htlc_id).cloned())
    }
}
