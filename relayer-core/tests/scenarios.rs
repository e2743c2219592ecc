//! Scenario tests (spec.md §8.2) driven against `MockChainAdapter`.

use relayer_core::chain::{Action, ChainId, Event, EventKind, EventPayload, MockChainAdapter};
use relayer_core::config::{ChainConfig, ServiceConfig};
use relayer_core::order::{HtlcMirror, HtlcPhase, OrderState};
use relayer_core::resolver::Resolver;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

fn test_config() -> ServiceConfig {
    toml::from_str(
        r#"
        [chain_a]
        rpc_url = "http://a.example"
        submission_key = "key-a"
        htlc_address = "0xA"
        bridge_address = "0xAB"

        [chain_b]
        rpc_url = "http://b.example"
        submission_key = "key-b"
        htlc_address = "0xB"
        bridge_address = "0xBB"
        "#,
    )
    .unwrap()
}

fn secret_and_hashlock(seed: u8) -> ([u8; 32], [u8; 32]) {
    let secret = [seed; 32];
    let hashlock: [u8; 32] = Sha256::digest(secret).into();
    (secret, hashlock)
}

struct Harness {
    resolver: Arc<Resolver>,
    chain_a: Arc<MockChainAdapter>,
    chain_b: Arc<MockChainAdapter>,
}

fn harness() -> Harness {
    let chain_a = Arc::new(MockChainAdapter::new(ChainId::A));
    let chain_b = Arc::new(MockChainAdapter::new(ChainId::B));
    let mut adapters: HashMap<ChainId, Arc<dyn relayer_core::chain::ChainAdapter>> = HashMap::new();
    adapters.insert(ChainId::A, chain_a.clone());
    adapters.insert(ChainId::B, chain_b.clone());
    let resolver = Arc::new(Resolver::new(test_config(), adapters));
    Harness {
        resolver,
        chain_a,
        chain_b,
    }
}

fn order_created_event(order_hash: [u8; 32], hashlock: [u8; 32], timelock: u64) -> Event {
    Event {
        kind: EventKind::OrderCreated,
        chain: ChainId::A,
        block_height: 10,
        tx_id: "tx-order".into(),
        log_index: 0,
        payload: EventPayload {
            order_hash: Some(order_hash),
            sender: Some("maker".into()),
            receiver: Some("receiver".into()),
            token: Some("native-a".into()),
            amount: Some(1_000),
            hashlock: Some(hashlock),
            timelock: Some(timelock),
            ..Default::default()
        },
    }
}

fn htlc_created_event(
    chain: ChainId,
    order_hash: [u8; 32],
    htlc_id: &str,
    hashlock: [u8; 32],
    timelock: u64,
    amount: u128,
    block_height: u64,
) -> Event {
    Event {
        kind: EventKind::HtlcCreated,
        chain,
        block_height,
        tx_id: format!("tx-htlc-{}", htlc_id),
        log_index: 0,
        payload: EventPayload {
            order_hash: Some(order_hash),
            htlc_id: Some(htlc_id.into()),
            hashlock: Some(hashlock),
            timelock: Some(timelock),
            amount: Some(amount),
            ..Default::default()
        },
    }
}

fn htlc_claimed_event(
    chain: ChainId,
    order_hash: [u8; 32],
    htlc_id: &str,
    secret: [u8; 32],
    block_height: u64,
) -> Event {
    Event {
        kind: EventKind::HtlcClaimed,
        chain,
        block_height,
        tx_id: format!("tx-claim-{}", htlc_id),
        log_index: 0,
        payload: EventPayload {
            order_hash: Some(order_hash),
            htlc_id: Some(htlc_id.into()),
            secret: Some(secret),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn happy_path_both_sides_claim_fulfills_order() {
    let h = harness();
    let order_hash = [7u8; 32];
    let (secret, hashlock) = secret_and_hashlock(5);

    h.resolver
        .on_event(order_created_event(order_hash, hashlock, 2_000_000))
        .await;
    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::SourceLocked
    );

    h.resolver
        .on_event(htlc_created_event(
            ChainId::A,
            order_hash,
            "htlc-a",
            hashlock,
            2_000_000,
            1_000,
            11,
        ))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::B,
            order_hash,
            "htlc-b",
            hashlock,
            1_000_000,
            950,
            12,
        ))
        .await;
    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::TargetLocked
    );

    // Receiver claims on the target chain, revealing the secret.
    h.resolver
        .on_event(htlc_claimed_event(ChainId::B, order_hash, "htlc-b", secret, 13))
        .await;

    // The resolver should have propagated the secret as a Claim action on A.
    let submitted = h.chain_a.submitted_actions().await;
    assert!(submitted
        .iter()
        .any(|a| matches!(a, Action::Claim { secret: s, .. } if *s == secret)));

    // Maker claims on the source chain using the revealed secret.
    h.resolver
        .on_event(htlc_claimed_event(ChainId::A, order_hash, "htlc-a", secret, 14))
        .await;

    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::Fulfilled
    );
}

#[tokio::test]
async fn hashlock_mismatch_fails_the_order() {
    let h = harness();
    let order_hash = [8u8; 32];
    let (_, hashlock) = secret_and_hashlock(1);
    let (_, wrong_hashlock) = secret_and_hashlock(2);

    h.resolver
        .on_event(order_created_event(order_hash, hashlock, 2_000_000))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::A,
            order_hash,
            "htlc-a",
            wrong_hashlock,
            2_000_000,
            1_000,
            11,
        ))
        .await;

    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::Failed
    );
}

#[tokio::test]
async fn timelock_skew_violation_fails_the_order() {
    let h = harness();
    let order_hash = [9u8; 32];
    let (_, hashlock) = secret_and_hashlock(3);

    h.resolver
        .on_event(order_created_event(order_hash, hashlock, 2_000_000))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::A,
            order_hash,
            "htlc-a",
            hashlock,
            2_000_000,
            1_000,
            11,
        ))
        .await;
    // Target timelock too close to source timelock — violates the
    // configured minimum skew.
    h.resolver
        .on_event(htlc_created_event(
            ChainId::B,
            order_hash,
            "htlc-b",
            hashlock,
            1_999_999,
            950,
            12,
        ))
        .await;

    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::Failed
    );
}

#[tokio::test]
async fn duplicate_events_are_idempotent() {
    let h = harness();
    let order_hash = [10u8; 32];
    let (_, hashlock) = secret_and_hashlock(4);

    let event = order_created_event(order_hash, hashlock, 2_000_000);
    h.resolver.on_event(event.clone()).await;
    h.resolver.on_event(event).await;

    // Second delivery of the identical (chain, tx, logIndex) is a no-op —
    // simulates replay after a crash before the cursor was persisted.
    assert_eq!(h.resolver.store().len(), 1);
}

#[tokio::test]
async fn timeout_sweep_refunds_source_when_deadline_passed() {
    let h = harness();
    let order_hash = [11u8; 32];
    let (_, hashlock) = secret_and_hashlock(6);

    // Timelock already in the past relative to "now" at test time.
    let past_timelock = 1;
    h.resolver
        .on_event(order_created_event(order_hash, hashlock, past_timelock))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::A,
            order_hash,
            "htlc-a",
            hashlock,
            past_timelock,
            1_000,
            11,
        ))
        .await;

    h.resolver.run_timeout_sweep().await;

    assert_eq!(
        h.resolver.store().get(&order_hash).unwrap().state,
        OrderState::Refunded
    );
    let submitted = h.chain_a.submitted_actions().await;
    assert!(submitted
        .iter()
        .any(|a| matches!(a, Action::Refund { htlc_id } if htlc_id == "htlc-a")));
}

#[tokio::test]
async fn reconciliation_corrects_drifted_mirror() {
    let h = harness();
    let order_hash = [12u8; 32];
    let (_secret, hashlock) = secret_and_hashlock(9);

    h.resolver
        .on_event(order_created_event(order_hash, hashlock, 2_000_000))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::A,
            order_hash,
            "htlc-a",
            hashlock,
            2_000_000,
            1_000,
            11,
        ))
        .await;
    h.resolver
        .on_event(htlc_created_event(
            ChainId::B,
            order_hash,
            "htlc-b",
            hashlock,
            1_000_000,
            950,
            12,
        ))
        .await;

    // Simulate a claim on chain A that the ingestor never observed — the
    // chain's authoritative view says Claimed, our mirror still says
    // Locked.
    h.chain_a
        .set_htlc(HtlcMirror {
            htlc_id: "htlc-a".into(),
            sender: "maker".into(),
            receiver: "receiver".into(),
            token: "native-a".into(),
            amount: 1_000,
            hashlock,
            timelock: 2_000_000,
            phase: HtlcPhase::Claimed,
        })
        .await;
    h.chain_b
        .set_htlc(HtlcMirror {
            htlc_id: "htlc-b".into(),
            sender: "receiver".into(),
            receiver: "receiver".into(),
            token: "native-b".into(),
            amount: 950,
            hashlock,
            timelock: 1_000_000,
            phase: HtlcPhase::Claimed,
        })
        .await;

    h.resolver.run_reconciliation().await;

    let order = h.resolver.store().get(&order_hash).unwrap();
    assert_eq!(order.source_htlc.unwrap().phase, HtlcPhase::Claimed);
    assert_eq!(order.target_htlc.unwrap().phase, HtlcPhase::Claimed);
    assert_eq!(order.state, OrderState::Fulfilled);
}
