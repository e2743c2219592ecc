//! Property-based tests (spec.md §8.3).

use proptest::prelude::*;
use relayer_core::order::{derive_order_hash, OrderParams};
use relayer_core::chain::ChainId;
use relayer_core::order::OrderState;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

fn arb_order_params(amount_in: u128, amount_out: u128, timelock: u64, target_timelock: u64) -> OrderParams {
    OrderParams {
        source_chain: ChainId::A,
        target_chain: ChainId::B,
        token_in: "native-a".into(),
        token_out: "native-b".into(),
        amount_in,
        amount_out,
        maker: "maker".into(),
        receiver: "receiver".into(),
        hashlock: [0x11; 32],
        timelock,
        target_timelock,
    }
}

proptest! {
    /// `derive_order_hash` is a pure function of its immutable fields: the
    /// same inputs always produce the same hash, and changing any one
    /// field changes it (spec.md §3.1).
    #[test]
    fn order_hash_is_deterministic_and_sensitive(
        amount_in in 0u128..1_000_000_000,
        amount_out in 0u128..1_000_000_000,
        timelock in 0u64..10_000_000,
        skew in 1u64..1_000_000,
    ) {
        let target_timelock = timelock.saturating_sub(skew);
        let params = arb_order_params(amount_in, amount_out, timelock, target_timelock);
        let a = derive_order_hash(&params);
        let b = derive_order_hash(&arb_order_params(amount_in, amount_out, timelock, target_timelock));
        prop_assert_eq!(a, b);

        let bumped = derive_order_hash(&arb_order_params(amount_in + 1, amount_out, timelock, target_timelock));
        prop_assert_ne!(a, bumped);
    }

    /// I2: the skew check is exactly `target + minSkew <= source`, for any
    /// combination of timelocks and skew.
    #[test]
    fn timelock_skew_matches_its_definition(
        source in 0u64..10_000_000,
        target in 0u64..10_000_000,
        min_skew in 0u64..1_000_000,
    ) {
        let params = arb_order_params(1, 1, source, target);
        let order = relayer_core::order::CrossChainOrder::new(params, 0);
        let expected = target.saturating_add(min_skew) <= source;
        prop_assert_eq!(order.satisfies_timelock_skew(min_skew), expected);
    }

    /// I1: a claim succeeds (by the resolver's own check) iff
    /// `H(secret) == hashlock`, checked via the same constant-time
    /// comparison the resolver uses — never a plain `==` on the digest.
    #[test]
    fn hashlock_equality_is_exact(secret_byte in 0u8..=255, other_byte in 0u8..=255) {
        let secret = [secret_byte; 32];
        let hashlock: [u8; 32] = Sha256::digest([other_byte; 32]).into();
        let digest: [u8; 32] = Sha256::digest(secret).into();
        let matches: bool = digest.ct_eq(&hashlock).into();
        prop_assert_eq!(matches, digest == hashlock);
    }

    /// I4: once an order reaches a terminal state, no further transition
    /// is ever accepted, regardless of which terminal state or which
    /// target state is attempted.
    #[test]
    fn terminal_states_reject_every_transition(
        terminal_idx in 0usize..3,
        target_idx in 0usize..6,
    ) {
        let terminals = [OrderState::Fulfilled, OrderState::Refunded, OrderState::Failed];
        let all = [
            OrderState::Pending,
            OrderState::SourceLocked,
            OrderState::TargetLocked,
            OrderState::Fulfilled,
            OrderState::Refunded,
            OrderState::Failed,
        ];
        let params = arb_order_params(1, 1, 2_000_000, 1_000_000);
        let mut order = relayer_core::order::CrossChainOrder::new(params, 0);
        order.state = terminals[terminal_idx];
        let result = order.transition(all[target_idx], 1);
        prop_assert!(result.is_err());
    }
}
