//! Hashlock collision detection (spec.md §4.3.6): two live orders sharing a
//! hashlock would let a single secret reveal settle both, so the
//! reconciliation pass runs this as a safety check over all non-terminal
//! orders before trusting any cross-chain claim propagation.

use crate::order::CrossChainOrder;
use std::collections::HashMap;

/// A collision: two non-terminal orders that share a hashlock.
#[derive(Debug, Clone)]
pub struct OrderMatch {
    pub hashlock: [u8; 32],
    pub order_a: [u8; 32],
    pub order_b: [u8; 32],
}

/// Groups non-terminal orders by hashlock and reports every pair that
/// collides. Empty in the overwhelming common case — hashlocks are drawn
/// from a 256-bit secret space (spec.md §3.1) — so a non-empty result is
/// itself a signal worth logging at `warn`.
pub fn find_matches(orders: &[CrossChainOrder]) -> Vec<OrderMatch> {
    let mut by_hashlock: HashMap<[u8; 32], Vec<[u8; 32]>> = HashMap::new();
    for order in orders {
        by_hashlock
            .entry(order.hashlock)
            .or_default()
            .push(order.order_hash);
    }

    let mut matches = Vec::new();
    for (hashlock, hashes) in by_hashlock {
        if hashes.len() < 2 {
            continue;
        }
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                matches.push(OrderMatch {
                    hashlock,
                    order_a: hashes[i],
                    order_b: hashes[j],
                });
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use crate::order::{OrderParams, OrderState};

    fn order_with_hashlock(hashlock: [u8; 32], amount: u128) -> CrossChainOrder {
        let params = OrderParams {
            source_chain: ChainId::A,
            target_chain: ChainId::B,
            token_in: "native-a".into(),
            token_out: "native-b".into(),
            amount_in: amount,
            amount_out: amount,
            maker: "maker".into(),
            receiver: "receiver".into(),
            hashlock,
            timelock: 2_000_000,
            target_timelock: 1_000_000,
        };
        CrossChainOrder::new(params, 0)
    }

    #[test]
    fn no_collision_for_distinct_hashlocks() {
        let orders = vec![order_with_hashlock([1; 32], 1), order_with_hashlock([2; 32], 2)];
        assert!(find_matches(&orders).is_empty());
    }

    #[test]
    fn flags_shared_hashlock() {
        let orders = vec![order_with_hashlock([9; 32], 1), order_with_hashlock([9; 32], 2)];
        let matches = find_matches(&orders);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hashlock, [9; 32]);
    }

    #[test]
    fn terminal_orders_are_excluded_by_caller() {
        let mut a = order_with_hashlock([3; 32], 1);
        a.state = OrderState::Fulfilled;
        let b = order_with_hashlock([3; 32], 2);
        // find_matches itself doesn't filter state; callers pass
        // all_non_terminal() results. Verify it still reports if given
        // a terminal order directly, since filtering is the caller's job.
        let matches = find_matches(&[a, b]);
        assert_eq!(matches.len(), 1);
    }
}
