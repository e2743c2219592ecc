//! The `CrossChainOrder` entity and its state machine (spec.md §3.1, §4.3.1).

use crate::chain::ChainId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One of the six non-error states an order passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    SourceLocked,
    TargetLocked,
    Fulfilled,
    Refunded,
    Failed,
}

impl OrderState {
    /// I4: `Fulfilled`, `Refunded`, `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Fulfilled | OrderState::Refunded | OrderState::Failed
        )
    }
}

/// Mirror of what the underlying chain holds for one side of the swap
/// (spec.md §3.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcPhase {
    Locked,
    Claimed,
    Refunded,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HtlcMirror {
    pub htlc_id: String,
    pub sender: String,
    pub receiver: String,
    pub token: String,
    pub amount: u128,
    pub hashlock: [u8; 32],
    pub timelock: u64,
    pub phase: HtlcPhase,
}

/// The unit of coordination (spec.md §3.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrossChainOrder {
    pub order_hash: [u8; 32],
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    pub amount_out: u128,
    pub maker: String,
    pub receiver: String,
    pub hashlock: [u8; 32],
    pub timelock: u64,
    pub target_timelock: u64,
    pub state: OrderState,
    pub source_htlc_id: Option<String>,
    pub target_htlc_id: Option<String>,
    pub source_htlc: Option<HtlcMirror>,
    pub target_htlc: Option<HtlcMirror>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set when a submission exhausted its retries (§7 `SubmitExhausted`).
    /// Not terminal — the timeout sweep still drives it to `Refunded`.
    pub needs_attention: bool,
}

/// Immutable fields an order is derived from (spec.md §3.1: "derived
/// deterministically from immutable fields").
pub struct OrderParams {
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    pub amount_out: u128,
    pub maker: String,
    pub receiver: String,
    pub hashlock: [u8; 32],
    pub timelock: u64,
    pub target_timelock: u64,
}

/// Derives a stable 32-byte identifier from an order's immutable fields.
pub fn derive_order_hash(params: &OrderParams) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", params.source_chain).as_bytes());
    hasher.update(format!("{:?}", params.target_chain).as_bytes());
    hasher.update(params.token_in.as_bytes());
    hasher.update(params.token_out.as_bytes());
    hasher.update(params.amount_in.to_be_bytes());
    hasher.update(params.amount_out.to_be_bytes());
    hasher.update(params.maker.as_bytes());
    hasher.update(params.receiver.as_bytes());
    hasher.update(params.hashlock);
    hasher.update(params.timelock.to_be_bytes());
    hasher.update(params.target_timelock.to_be_bytes());
    hasher.finalize().into()
}

impl CrossChainOrder {
    pub fn new(params: OrderParams, now: i64) -> Self {
        let order_hash = derive_order_hash(&params);
        Self {
            order_hash,
            source_chain: params.source_chain,
            target_chain: params.target_chain,
            token_in: params.token_in,
            token_out: params.token_out,
            amount_in: params.amount_in,
            amount_out: params.amount_out,
            maker: params.maker,
            receiver: params.receiver,
            hashlock: params.hashlock,
            timelock: params.timelock,
            target_timelock: params.target_timelock,
            state: OrderState::Pending,
            source_htlc_id: None,
            target_htlc_id: None,
            source_htlc: None,
            target_htlc: None,
            created_at: now,
            updated_at: now,
            needs_attention: false,
        }
    }

    /// I2: the configured skew `Δ` must hold between the two timelocks.
    pub fn satisfies_timelock_skew(&self, min_skew_secs: u64) -> bool {
        self.target_timelock + min_skew_secs <= self.timelock
    }

    /// Applies a state transition, rejecting anything out of terminal
    /// states (I4) and anything not named in spec.md §4.3.1.
    pub fn transition(&mut self, to: OrderState, now: i64) -> Result<(), crate::error::OrderError> {
        if self.state.is_terminal() {
            return Err(crate::error::OrderError::InvalidTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", to),
            });
        }
        let valid = matches!(
            (self.state, to),
            (OrderState::Pending, OrderState::SourceLocked)
                | (OrderState::SourceLocked, OrderState::TargetLocked)
                | (OrderState::SourceLocked, OrderState::Failed)
                | (OrderState::SourceLocked, OrderState::Refunded)
                | (OrderState::TargetLocked, OrderState::SourceLocked) // reconciliation revert
                | (OrderState::TargetLocked, OrderState::Fulfilled)
                | (OrderState::TargetLocked, OrderState::Failed)
                | (OrderState::TargetLocked, OrderState::Refunded)
                | (OrderState::Pending, OrderState::Failed)
                | (OrderState::Pending, OrderState::Refunded)
        );
        if !valid {
            return Err(crate::error::OrderError::InvalidTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", to),
            });
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> OrderParams {
        OrderParams {
            source_chain: ChainId::A,
            target_chain: ChainId::B,
            token_in: "native-a".into(),
            token_out: "native-b".into(),
            amount_in: 1_000_000_000_000_000_000,
            amount_out: 980_000_000_000_000_000,
            maker: "maker-addr".into(),
            receiver: "receiver-addr".into(),
            hashlock: [0x42; 32],
            timelock: 2_000_000,
            target_timelock: 1_000_000,
        }
    }

    #[test]
    fn order_hash_is_deterministic() {
        let a = derive_order_hash(&sample_params());
        let b = derive_order_hash(&sample_params());
        assert_eq!(a, b);
    }

    #[test]
    fn order_hash_changes_with_amount() {
        let mut params = sample_params();
        let a = derive_order_hash(&params);
        params.amount_in += 1;
        let b = derive_order_hash(&params);
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_transition_out_of_terminal_state() {
        let mut order = CrossChainOrder::new(sample_params(), 0);
        order.transition(OrderState::SourceLocked, 1).unwrap();
        order.transition(OrderState::TargetLocked, 2).unwrap();
        order.transition(OrderState::Fulfilled, 3).unwrap();
        assert!(order.transition(OrderState::Refunded, 4).is_err());
    }

    #[test]
    fn timelock_skew_check() {
        let mut order = CrossChainOrder::new(sample_params(), 0);
        assert!(order.satisfies_timelock_skew(2 * 3600));
        order.target_timelock = order.timelock;
        assert!(!order.satisfies_timelock_skew(2 * 3600));
    }
}
