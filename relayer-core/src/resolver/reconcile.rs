//! Reconciliation (spec.md §4.3.4): periodically re-reads each live HTLC's
//! authoritative on-chain state through `ChainAdapter::htlc_view` and
//! corrects any mirror that has drifted from it — the backstop for events
//! the ingestor missed or a reorg silently rewrote.

use super::matching::find_matches;
use super::Resolver;
use crate::order::{HtlcPhase, OrderState};
use chrono::Utc;
use tracing::{info, warn};

pub(super) async fn run(resolver: &Resolver) {
    let orders = resolver.store().all_non_terminal();

    for collision in find_matches(&orders) {
        warn!(
            hashlock = %hex::encode(collision.hashlock),
            order_a = %hex::encode(collision.order_a),
            order_b = %hex::encode(collision.order_b),
            "reconciliation found two live orders sharing a hashlock"
        );
    }

    for order in orders {
        let lock = resolver.store().order_lock(order.order_hash);
        let _guard = lock.lock().await;
        let order = match resolver.store().get(&order.order_hash) {
            Some(o) if !o.state.is_terminal() => o,
            _ => continue,
        };

        if let Some(htlc_id) = order.source_htlc_id.clone() {
            reconcile_side(resolver, order.order_hash, order.source_chain, &htlc_id, true).await;
        }
        if let Some(htlc_id) = order.target_htlc_id.clone() {
            reconcile_side(resolver, order.order_hash, order.target_chain, &htlc_id, false).await;
        }
    }
}

async fn reconcile_side(
    resolver: &Resolver,
    order_hash: [u8; 32],
    chain: crate::chain::ChainId,
    htlc_id: &str,
    is_source: bool,
) {
    let adapter = resolver.adapter_for(chain);
    let authoritative = match adapter.htlc_view(htlc_id).await {
        Ok(view) => view,
        Err(err) => {
            warn!(order = %hex::encode(order_hash), %htlc_id, error = %err, "reconciliation could not read authoritative HTLC state");
            return;
        }
    };

    let Some(authoritative) = authoritative else {
        return;
    };

    let now = Utc::now().timestamp();
    let changed = resolver
        .store()
        .update(&order_hash, |o| {
            let mirror = if is_source {
                o.source_htlc.as_mut()
            } else {
                o.target_htlc.as_mut()
            };
            let Some(mirror) = mirror else { return };
            if mirror.phase == authoritative.phase {
                return;
            }
            info!(
                order = %hex::encode(order_hash),
                side = if is_source { "source" } else { "target" },
                was = ?mirror.phase,
                now = ?authoritative.phase,
                "reconciliation corrected HTLC phase"
            );
            mirror.phase = authoritative.phase;

            match (is_source, authoritative.phase) {
                (true, HtlcPhase::Refunded) => {
                    let _ = o.transition(OrderState::Refunded, now);
                }
                (false, HtlcPhase::Claimed) if o.source_htlc.as_ref().map(|h| h.phase) == Some(HtlcPhase::Claimed) => {
                    let _ = o.transition(OrderState::Fulfilled, now);
                }
                _ => {}
            }
        });

    if let Err(err) = changed {
        warn!(order = %hex::encode(order_hash), error = %err, "reconciliation failed to apply correction");
    }
}
