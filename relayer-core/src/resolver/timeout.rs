//! Timeout sweep (spec.md §4.3.3): force a refund once an HTLC's timelock is
//! within the configured early-refund buffer, rather than waiting for the
//! counterparty chain to emit `HtlcRefunded` on its own.

use super::Resolver;
use crate::chain::Action;
use crate::order::{HtlcPhase, OrderState};
use chrono::Utc;
use tracing::{error, info, warn};

pub(super) async fn run(resolver: &Resolver) {
    let buffer = resolver.config().order_timeout_buffer_secs;
    let now = Utc::now().timestamp() as u64;

    for order in resolver.store().all_non_terminal() {
        let lock = resolver.store().order_lock(order.order_hash);
        let _guard = lock.lock().await;

        // Re-read under the lock: another handler may have settled the
        // order between the snapshot above and acquiring the guard.
        let order = match resolver.store().get(&order.order_hash) {
            Some(o) if !o.state.is_terminal() => o,
            _ => continue,
        };

        let source_due = order
            .source_htlc
            .as_ref()
            .map(|h| h.phase == HtlcPhase::Locked && due(now, h.timelock, buffer))
            .unwrap_or(false);
        let target_due = order
            .target_htlc
            .as_ref()
            .map(|h| h.phase == HtlcPhase::Locked && due(now, h.timelock, buffer))
            .unwrap_or(false);

        if target_due {
            if let Some(htlc_id) = order.target_htlc_id.clone() {
                let adapter = resolver.adapter_for(order.target_chain);
                match adapter.submit(Action::Refund { htlc_id }).await {
                    Ok(tx_id) => info!(order = %hex::encode(order.order_hash), %tx_id, "target HTLC refund submitted on timeout"),
                    Err(err) => warn!(order = %hex::encode(order.order_hash), error = %err, "target refund submission failed"),
                }
            }
        }

        if source_due {
            if let Some(htlc_id) = order.source_htlc_id.clone() {
                let adapter = resolver.adapter_for(order.source_chain);
                match adapter.submit(Action::Refund { htlc_id }).await {
                    Ok(tx_id) => {
                        info!(order = %hex::encode(order.order_hash), %tx_id, "source HTLC refund submitted on timeout");
                        if let Err(err) = resolver.store().update(&order.order_hash, |o| {
                            let _ = o.transition(OrderState::Refunded, now as i64);
                        }) {
                            error!(order = %hex::encode(order.order_hash), error = %err, "failed to record refund transition");
                        }
                    }
                    Err(err) => warn!(order = %hex::encode(order.order_hash), error = %err, "source refund submission failed"),
                }
            }
        }
    }
}

/// `now >= timelock - buffer`, saturating so a buffer larger than the
/// timelock itself just means "always due".
fn due(now: u64, timelock: u64, buffer: u64) -> bool {
    now >= timelock.saturating_sub(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_respects_buffer() {
        assert!(!due(100, 200, 50));
        assert!(due(150, 200, 50));
        assert!(due(1000, 200, 50));
    }
}
