//! Chain adapter: a uniform façade over an external ledger (spec.md §4.1, §6.1).

mod rpc;

pub use rpc::{MockChainAdapter, RpcChainAdapter};

use crate::error::AdapterError;
use crate::order::HtlcMirror;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies one of the two ledgers a swap runs across. Chain identity is
/// data, not a type — a single `ChainAdapter` implementation serves either
/// side (spec.md §9, "dynamic polymorphism over chain").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    A,
    B,
}

impl ChainId {
    pub fn other(self) -> ChainId {
        match self {
            ChainId::A => ChainId::B,
            ChainId::B => ChainId::A,
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::A => write!(f, "chain-a"),
            ChainId::B => write!(f, "chain-b"),
        }
    }
}

/// Normalized, chain-agnostic event kind (spec.md §3.1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    OrderCreated,
    OrderFulfilled,
    OrderRefunded,
    HtlcCreated,
    HtlcClaimed,
    HtlcRefunded,
}

/// Kind-specific event fields. Only the fields each kind actually carries
/// are populated; the rest are `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub order_hash: Option<[u8; 32]>,
    pub htlc_id: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub token: Option<String>,
    pub amount: Option<u128>,
    pub hashlock: Option<[u8; 32]>,
    pub timelock: Option<u64>,
    /// Only ever populated from `HtlcClaimed` — spec.md §9 open question:
    /// no other channel (e.g. an `OrderCreated` memo field) is trusted as a
    /// secret-revelation source, even if the underlying chain emits one.
    pub secret: Option<[u8; 32]>,
}

/// A normalized, chain-agnostic event (spec.md §3.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub chain: ChainId,
    pub block_height: u64,
    pub tx_id: String,
    pub log_index: u32,
    pub payload: EventPayload,
}

impl Event {
    /// The `(chain, txId, logIndex)` tuple used for both per-chain ordering
    /// and resolver-side idempotence (spec.md §3.1, §4.3.2).
    pub fn dedup_key(&self) -> (ChainId, String, u32) {
        (self.chain, self.tx_id.clone(), self.log_index)
    }

    pub fn order_key(&self) -> (u64, u32) {
        (self.block_height, self.log_index)
    }
}

/// Action the resolver asks an adapter to submit (spec.md §4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Action {
    CreateHtlc {
        receiver: String,
        hashlock: [u8; 32],
        timelock: u64,
        token: String,
        amount: u128,
    },
    Claim {
        htlc_id: String,
        secret: [u8; 32],
    },
    Refund {
        htlc_id: String,
    },
    ProcessIncomingOrder {
        order_hash: [u8; 32],
    },
    FulfillIncomingOrder {
        order_hash: [u8; 32],
        secret: [u8; 32],
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    pub status: ReceiptStatus,
    pub block_height: u64,
    pub logs: Vec<Event>,
}

/// Chain-specific fee quote; refreshed on a timer, stale values accepted
/// per spec.md §4.1, §9.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FeeQuote {
    pub base_fee: u128,
    pub gas_price: u128,
}

/// Uniform capability set over an external ledger (spec.md §4.1, §6.1).
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> ChainId;

    async fn tip_height(&self) -> Result<u64, AdapterError>;

    /// `max(0, tipHeight - K)`.
    async fn confirmed_height(&self, confirmation_depth: u64) -> Result<u64, AdapterError> {
        let tip = self.tip_height().await?;
        Ok(tip.saturating_sub(confirmation_depth))
    }

    /// Inclusive range, ordered by `(blockHeight, logIndex)`. The adapter
    /// enforces the `W`-block window itself; callers must not rely on the
    /// ingestor alone to bound it.
    async fn query_events(
        &self,
        from_height: u64,
        to_height: u64,
        max_blocks_per_query: u64,
    ) -> Result<Vec<Event>, AdapterError>;

    async fn submit(&self, action: Action) -> Result<String, AdapterError>;

    async fn wait_for_receipt(
        &self,
        tx_id: &str,
        timeout: Duration,
    ) -> Result<Receipt, AdapterError>;

    async fn current_fee_quote(&self) -> Result<FeeQuote, AdapterError>;

    /// Authoritative view of a single HTLC, used by reconciliation
    /// (spec.md §4.3.4, the `getOrder`/view-call surface of §6.1) rather
    /// than by the ingestion path.
    async fn htlc_view(&self, htlc_id: &str) -> Result<Option<HtlcMirror>, AdapterError>;
}
