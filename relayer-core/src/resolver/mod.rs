//! Resolver / protocol engine (spec.md §4.3): the order state machine,
//! cross-chain invariants, secret store, and match table.

mod matching;
mod reconcile;
mod store;
mod timeout;

pub use matching::{find_matches, OrderMatch};
pub use store::OrderStore;

use crate::chain::{Action, ChainAdapter, ChainId, Event, EventKind};
use crate::config::ServiceConfig;
use crate::error::{InvariantError, OrderError, ResolverError};
use crate::order::{CrossChainOrder, HtlcMirror, HtlcPhase, OrderState};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

/// Stats snapshot for `get_stats()` (spec.md §6.3 supplement, SPEC_FULL.md §6.3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResolverStats {
    pub pending_orders: usize,
    pub by_state: HashMap<String, usize>,
}

/// Holds the order table, secret store, and the two chain adapters, and
/// consumes events and clock ticks per spec.md §4.3.
pub struct Resolver {
    store: Arc<OrderStore>,
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
    config: ServiceConfig,
}

impl Resolver {
    pub fn new(config: ServiceConfig, adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>) -> Self {
        let store = Arc::new(OrderStore::new(config.max_pending_orders));
        Self {
            store,
            adapters,
            config,
        }
    }

    pub fn store(&self) -> Arc<OrderStore> {
        self.store.clone()
    }

    fn adapter(&self, chain: ChainId) -> &Arc<dyn ChainAdapter> {
        self.adapters
            .get(&chain)
            .expect("adapter must be registered for every ChainId variant")
    }

    pub fn stats(&self) -> ResolverStats {
        crate::metrics::ORDERS_PENDING.set(self.store.len() as i64);
        let mut by_state = HashMap::new();
        for state in [
            OrderState::Pending,
            OrderState::SourceLocked,
            OrderState::TargetLocked,
            OrderState::Fulfilled,
            OrderState::Refunded,
            OrderState::Failed,
        ] {
            by_state.insert(format!("{:?}", state), self.store.count_by_state(state));
        }
        ResolverStats {
            pending_orders: self.store.len(),
            by_state,
        }
    }

    /// `onEvent(e)`: idempotent, keyed by `(chain, txId, logIndex)`
    /// (spec.md §4.3.2). Never raises out of this call — failures become
    /// order-state annotations and log/metric events (spec.md §7).
    pub async fn on_event(&self, event: Event) {
        if !self.store.mark_seen(event.dedup_key()) {
            debug!(chain = %event.chain, tx = %event.tx_id, log_index = event.log_index, "duplicate event, skipping");
            crate::metrics::EVENTS_DUPLICATE
                .with_label_values(&[&event.chain.to_string()])
                .inc();
            return;
        }
        crate::metrics::EVENTS_INGESTED
            .with_label_values(&[&event.chain.to_string(), &format!("{:?}", event.kind)])
            .inc();

        let order_hash = match event.payload.order_hash {
            Some(hash) => hash,
            None => {
                warn!(kind = ?event.kind, "event missing order_hash, dropping");
                return;
            }
        };

        let lock = self.store.order_lock(order_hash);
        let _guard = lock.lock().await;

        let result = match event.kind {
            EventKind::OrderCreated => self.handle_order_created(&event, order_hash).await,
            EventKind::HtlcCreated => self.handle_htlc_created(&event, order_hash).await,
            EventKind::HtlcClaimed => self.handle_htlc_claimed(&event, order_hash).await,
            EventKind::HtlcRefunded => self.handle_htlc_refunded(&event, order_hash).await,
            EventKind::OrderFulfilled | EventKind::OrderRefunded => {
                // Advisory; reconciliation (§4.3.4) is the authority for
                // resolving any discrepancy these imply.
                debug!(order = %hex::encode(order_hash), kind = ?event.kind, "advisory event noted");
                Ok(())
            }
        };

        if let Err(err) = result {
            error!(order = %hex::encode(order_hash), kind = ?event.kind, error = %err, "event handling failed");
        }
    }

    async fn handle_order_created(
        &self,
        event: &Event,
        order_hash: [u8; 32],
    ) -> Result<(), ResolverError> {
        let payload = &event.payload;
        let (hashlock, timelock, amount, maker, receiver, token) = (
            payload.hashlock,
            payload.timelock,
            payload.amount,
            payload.sender.clone(),
            payload.receiver.clone(),
            payload.token.clone(),
        );

        if self.store.get(&order_hash).is_some() {
            return Err(ResolverError::Order(OrderError::AlreadyExists(hex::encode(
                order_hash,
            ))));
        }

        let target_chain = event.chain.other();
        let order = CrossChainOrder {
            order_hash,
            source_chain: event.chain,
            target_chain,
            token_in: token.unwrap_or_default(),
            token_out: String::new(),
            amount_in: amount.unwrap_or_default(),
            amount_out: 0,
            maker: maker.unwrap_or_default(),
            receiver: receiver.unwrap_or_default(),
            hashlock: hashlock.unwrap_or_default(),
            timelock: timelock.unwrap_or_default(),
            target_timelock: 0,
            state: OrderState::Pending,
            source_htlc_id: None,
            target_htlc_id: None,
            source_htlc: None,
            target_htlc: None,
            created_at: now(),
            updated_at: now(),
            needs_attention: false,
        };
        self.store.insert(order)?;
        self.store
            .update(&order_hash, |o| {
                let _ = o.transition(OrderState::SourceLocked, now());
            })
            .ok();

        // Relay: enqueue a ProcessIncomingOrder action on the target chain
        // so chain B can mirror the order before it has locked anything
        // (spec.md §4.3.2). Submission failures here are `Transient` /
        // `SubmitExhausted`, not an invariant breach — the target HTLC
        // observation path still works without the mirrored record
        // (spec.md §9, asymmetric bridge open question).
        let target_adapter = self.adapter(target_chain).clone();
        match target_adapter
            .submit(Action::ProcessIncomingOrder { order_hash })
            .await
        {
            Ok(tx_id) => info!(order = %hex::encode(order_hash), %tx_id, "relayed order to target chain"),
            Err(err) => warn!(order = %hex::encode(order_hash), error = %err, "failed to relay order to target chain"),
        }
        info!(order = %hex::encode(order_hash), "order created, source locked");
        Ok(())
    }

    async fn handle_htlc_created(
        &self,
        event: &Event,
        order_hash: [u8; 32],
    ) -> Result<(), ResolverError> {
        let order = self
            .store
            .get(&order_hash)
            .ok_or_else(|| ResolverError::Order(OrderError::NotFound(hex::encode(order_hash))))?;

        let htlc_id = event
            .payload
            .htlc_id
            .clone()
            .ok_or_else(|| ResolverError::Other("HtlcCreated missing htlc_id".into()))?;
        let hashlock = event.payload.hashlock.unwrap_or_default();
        let timelock = event.payload.timelock.unwrap_or_default();
        let amount = event.payload.amount.unwrap_or_default();

        if event.chain == order.source_chain {
            // I6: at most one live HTLC per order per chain.
            if order.source_htlc_id.is_some() {
                return Err(ResolverError::Invariant(InvariantError::DuplicateHtlc {
                    order: hex::encode(order_hash),
                    chain: event.chain.to_string(),
                }));
            }
            if amount != order.amount_in {
                return self
                    .fail_order(
                        order_hash,
                        InvariantError::AmountMismatch {
                            order: hex::encode(order_hash),
                            chain: event.chain.to_string(),
                            expected: order.amount_in,
                            observed: amount,
                        },
                    )
                    .await;
            }
            if hashlock != order.hashlock {
                return self
                    .fail_order(
                        order_hash,
                        InvariantError::HashlockMismatch {
                            order: hex::encode(order_hash),
                            expected: hex::encode(order.hashlock),
                            actual: hex::encode(hashlock),
                        },
                    )
                    .await;
            }
            self.store.update(&order_hash, |o| {
                o.source_htlc_id = Some(htlc_id.clone());
                o.source_htlc = Some(HtlcMirror {
                    htlc_id: htlc_id.clone(),
                    sender: o.maker.clone(),
                    receiver: o.receiver.clone(),
                    token: o.token_in.clone(),
                    amount,
                    hashlock,
                    timelock,
                    phase: HtlcPhase::Locked,
                });
                o.updated_at = now();
            })?;
            Ok(())
        } else {
            if order.target_htlc_id.is_some() {
                return Err(ResolverError::Invariant(InvariantError::DuplicateHtlc {
                    order: hex::encode(order_hash),
                    chain: event.chain.to_string(),
                }));
            }
            if hashlock != order.hashlock {
                return self
                    .fail_order(
                        order_hash,
                        InvariantError::HashlockMismatch {
                            order: hex::encode(order_hash),
                            expected: hex::encode(order.hashlock),
                            actual: hex::encode(hashlock),
                        },
                    )
                    .await;
            }
            // I2: target timelock must expire strictly before source's,
            // by at least the configured skew.
            if timelock + self.config.min_timelock_skew_secs > order.timelock {
                return self
                    .fail_order(
                        order_hash,
                        InvariantError::TimelockSkew {
                            order: hex::encode(order_hash),
                            target: timelock,
                            source: order.timelock,
                            min_skew: self.config.min_timelock_skew_secs,
                        },
                    )
                    .await;
            }
            self.store.update(&order_hash, |o| {
                o.target_htlc_id = Some(htlc_id.clone());
                o.target_timelock = timelock;
                o.amount_out = amount;
                o.target_htlc = Some(HtlcMirror {
                    htlc_id: htlc_id.clone(),
                    sender: o.receiver.clone(),
                    receiver: o.receiver.clone(),
                    token: o.token_out.clone(),
                    amount,
                    hashlock,
                    timelock,
                    phase: HtlcPhase::Locked,
                });
                let _ = o.transition(OrderState::TargetLocked, now());
            })?;
            info!(order = %hex::encode(order_hash), "target locked");
            Ok(())
        }
    }

    async fn handle_htlc_claimed(
        &self,
        event: &Event,
        order_hash: [u8; 32],
    ) -> Result<(), ResolverError> {
        let order = self
            .store
            .get(&order_hash)
            .ok_or_else(|| ResolverError::Order(OrderError::NotFound(hex::encode(order_hash))))?;

        let secret = event
            .payload
            .secret
            .ok_or_else(|| ResolverError::Other("HtlcClaimed missing secret".into()))?;

        if !hashlock_matches(&secret, &order.hashlock) {
            return self
                .fail_order(
                    order_hash,
                    InvariantError::HashlockMismatch {
                        order: hex::encode(order_hash),
                        expected: hex::encode(order.hashlock),
                        actual: hex::encode(sha256(&secret)),
                    },
                )
                .await;
        }

        self.store.store_secret(order_hash, secret);

        let claimed_chain = event.chain;
        let other_chain = claimed_chain.other();
        self.store.update(&order_hash, |o| {
            if claimed_chain == o.source_chain {
                if let Some(htlc) = o.source_htlc.as_mut() {
                    htlc.phase = HtlcPhase::Claimed;
                }
            } else if let Some(htlc) = o.target_htlc.as_mut() {
                htlc.phase = HtlcPhase::Claimed;
            }
        })?;

        // If the other side still has a live HTLC we control the claim
        // role on, propagate the secret (spec.md §4.3.5).
        let other_live = match other_chain {
            c if c == order.source_chain => order
                .source_htlc
                .as_ref()
                .map(|h| h.phase == HtlcPhase::Locked)
                .unwrap_or(false),
            _ => order
                .target_htlc
                .as_ref()
                .map(|h| h.phase == HtlcPhase::Locked)
                .unwrap_or(false),
        };

        if other_live {
            let htlc_id = if other_chain == order.source_chain {
                order.source_htlc_id.clone()
            } else {
                order.target_htlc_id.clone()
            };
            if let Some(htlc_id) = htlc_id {
                let adapter = self.adapter(other_chain).clone();
                match adapter.submit(Action::Claim { htlc_id, secret }).await {
                    Ok(tx_id) => info!(order = %hex::encode(order_hash), %tx_id, chain = %other_chain, "submitted claim with revealed secret"),
                    Err(err) => {
                        warn!(order = %hex::encode(order_hash), chain = %other_chain, error = %err, "claim submission failed, will retry via reconciliation");
                        crate::metrics::SUBMISSIONS_FAILED
                            .with_label_values(&[&other_chain.to_string()])
                            .inc();
                        self.store.update(&order_hash, |o| o.needs_attention = true)?;
                    }
                }
            }
        } else {
            // Both sides claimed.
            self.store.update(&order_hash, |o| {
                let _ = o.transition(OrderState::Fulfilled, now());
            })?;
            info!(order = %hex::encode(order_hash), "order fulfilled");
        }
        Ok(())
    }

    async fn handle_htlc_refunded(
        &self,
        event: &Event,
        order_hash: [u8; 32],
    ) -> Result<(), ResolverError> {
        let order = self
            .store
            .get(&order_hash)
            .ok_or_else(|| ResolverError::Order(OrderError::NotFound(hex::encode(order_hash))))?;

        self.store.update(&order_hash, |o| {
            if event.chain == o.source_chain {
                if let Some(htlc) = o.source_htlc.as_mut() {
                    htlc.phase = HtlcPhase::Refunded;
                }
            } else if let Some(htlc) = o.target_htlc.as_mut() {
                htlc.phase = HtlcPhase::Refunded;
            }
        })?;

        if event.chain == order.source_chain {
            self.store.update(&order_hash, |o| {
                let _ = o.transition(OrderState::Refunded, now());
            })?;
            info!(order = %hex::encode(order_hash), "order refunded");
        }
        // If only the target refunded, source remains live: continue
        // until the source refunds or is forced by the timeout sweep.
        Ok(())
    }

    async fn fail_order(
        &self,
        order_hash: [u8; 32],
        cause: InvariantError,
    ) -> Result<(), ResolverError> {
        error!(order = %hex::encode(order_hash), error = %cause, "invariant breach, order failed");
        let kind = match &cause {
            InvariantError::HashlockMismatch { .. } => "hashlock_mismatch",
            InvariantError::AmountMismatch { .. } => "amount_mismatch",
            InvariantError::TimelockSkew { .. } => "timelock_skew",
            InvariantError::DuplicateHtlc { .. } => "duplicate_htlc",
        };
        crate::metrics::INVARIANT_BREACHES
            .with_label_values(&[kind])
            .inc();
        self.store.update(&order_hash, |o| {
            let _ = o.transition(OrderState::Failed, now());
        })?;
        Err(ResolverError::Invariant(cause))
    }

    /// §4.3.3 timeout sweep, run by the Supervisor every 60s.
    pub async fn run_timeout_sweep(&self) {
        timeout::run(self).await;
    }

    /// §4.3.4 reconciliation, run by the Supervisor every N minutes.
    pub async fn run_reconciliation(&self) {
        reconcile::run(self).await;
    }

    pub(crate) fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn adapter_for(&self, chain: ChainId) -> Arc<dyn ChainAdapter> {
        self.adapter(chain).clone()
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

/// Constant-time `H(secret) == hashlock` check (I1).
fn hashlock_matches(secret: &[u8; 32], hashlock: &[u8; 32]) -> bool {
    let digest = sha256(secret);
    digest.ct_eq(hashlock).into()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
