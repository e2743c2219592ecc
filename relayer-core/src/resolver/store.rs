//! `OrderStore`: the single encapsulation boundary for the orders table and
//! secret store (spec.md §9, "global mutable state"). Built the way the
//! teacher's `AtomicSwapCache` wraps a `DashMap` behind a narrow API.

use crate::chain::ChainId;
use crate::error::{OrderError, ResolverError};
use crate::order::{CrossChainOrder, OrderState};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `(chain, txId, logIndex)` — the idempotence key from spec.md §3.1/§4.3.2.
pub type DedupKey = (ChainId, String, u32);

/// Encapsulates the orders table, the secret store, the event de-dup set,
/// and per-order serialization locks (spec.md §5: "single-writer-per-order").
pub struct OrderStore {
    orders: DashMap<[u8; 32], CrossChainOrder>,
    secrets: DashMap<[u8; 32], [u8; 32]>,
    dedup: DashMap<DedupKey, ()>,
    locks: DashMap<[u8; 32], Arc<Mutex<()>>>,
    max_pending_orders: usize,
}

impl OrderStore {
    pub fn new(max_pending_orders: usize) -> Self {
        Self {
            orders: DashMap::new(),
            secrets: DashMap::new(),
            dedup: DashMap::new(),
            locks: DashMap::new(),
            max_pending_orders,
        }
    }

    /// Acquires the per-order mutation lock, realizing the single-writer
    /// discipline of spec.md §5. Callers hold the guard for the duration of
    /// one handler invocation (`onEvent`, timeout check, or reconciliation
    /// pass) and release it before returning.
    pub fn order_lock(&self, order_hash: [u8; 32]) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_hash)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// §4.3.7: capped at `MAX_PENDING_ORDERS`. On insert when full, evict
    /// the oldest terminal order; if none is terminal, reject with
    /// `Capacity`.
    pub fn insert(&self, order: CrossChainOrder) -> Result<(), ResolverError> {
        if self.orders.contains_key(&order.order_hash) {
            return Err(ResolverError::Order(OrderError::AlreadyExists(hex::encode(
                order.order_hash,
            ))));
        }
        if self.orders.len() >= self.max_pending_orders {
            let oldest_terminal = self
                .orders
                .iter()
                .filter(|entry| entry.state.is_terminal())
                .min_by_key(|entry| entry.updated_at)
                .map(|entry| entry.order_hash);
            match oldest_terminal {
                Some(victim) => {
                    self.orders.remove(&victim);
                    self.secrets.remove(&victim);
                    self.locks.remove(&victim);
                }
                None => {
                    return Err(ResolverError::Capacity {
                        max: self.max_pending_orders,
                    })
                }
            }
        }
        self.orders.insert(order.order_hash, order);
        Ok(())
    }

    pub fn get(&self, order_hash: &[u8; 32]) -> Option<CrossChainOrder> {
        self.orders.get(order_hash).map(|entry| entry.clone())
    }

    pub fn update<F>(&self, order_hash: &[u8; 32], f: F) -> Result<(), ResolverError>
    where
        F: FnOnce(&mut CrossChainOrder),
    {
        let mut entry = self
            .orders
            .get_mut(order_hash)
            .ok_or_else(|| ResolverError::Order(OrderError::NotFound(hex::encode(order_hash))))?;
        f(&mut entry);
        Ok(())
    }

    pub fn all_non_terminal(&self) -> Vec<CrossChainOrder> {
        self.orders
            .iter()
            .filter(|entry| !entry.state.is_terminal())
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<CrossChainOrder> {
        self.orders.iter().map(|entry| entry.clone()).collect()
    }

    pub fn store_secret(&self, order_hash: [u8; 32], secret: [u8; 32]) {
        self.secrets.insert(order_hash, secret);
    }

    pub fn secret(&self, order_hash: &[u8; 32]) -> Option<[u8; 32]> {
        self.secrets.get(order_hash).map(|entry| *entry)
    }

    /// Clears a terminal order's secret along with the order itself.
    /// Garbage collection of orders past the retention horizon (spec.md
    /// §3.3) calls this.
    pub fn remove(&self, order_hash: &[u8; 32]) {
        self.orders.remove(order_hash);
        self.secrets.remove(order_hash);
        self.locks.remove(order_hash);
    }

    /// Returns `true` if this is the first time this key has been seen —
    /// the idempotence gate for `onEvent` (spec.md §4.3.2).
    pub fn mark_seen(&self, key: DedupKey) -> bool {
        self.dedup.insert(key, ()).is_none()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn count_by_state(&self, state: OrderState) -> usize {
        self.orders.iter().filter(|entry| entry.state == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{derive_order_hash, OrderParams};

    fn sample_order(seed: u8) -> CrossChainOrder {
        let params = OrderParams {
            source_chain: ChainId::A,
            target_chain: ChainId::B,
            token_in: "native-a".into(),
            token_out: "native-b".into(),
            amount_in: 1_000 + seed as u128,
            amount_out: 900,
            maker: "maker".into(),
            receiver: "receiver".into(),
            hashlock: [seed; 32],
            timelock: 2_000_000,
            target_timelock: 1_000_000,
        };
        CrossChainOrder::new(params, seed as i64)
    }

    #[test]
    fn dedup_only_fires_once() {
        let store = OrderStore::new(10);
        let key: DedupKey = (ChainId::A, "tx1".into(), 0);
        assert!(store.mark_seen(key.clone()));
        assert!(!store.mark_seen(key));
    }

    #[test]
    fn capacity_evicts_oldest_terminal_when_full() {
        let store = OrderStore::new(2);
        let mut first = sample_order(1);
        first.transition(OrderState::SourceLocked, 1).unwrap();
        first.transition(OrderState::Refunded, 2).unwrap();
        let first_hash = first.order_hash;
        store.insert(first).unwrap();
        store.insert(sample_order(2)).unwrap();

        // Store is full but has one terminal order — insertion evicts it.
        store.insert(sample_order(3)).unwrap();
        assert!(store.get(&first_hash).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn capacity_rejects_when_no_terminal_order_to_evict() {
        let store = OrderStore::new(1);
        store.insert(sample_order(1)).unwrap();
        let err = store.insert(sample_order(2));
        assert!(err.is_err());
    }
}
