//! Prometheus metrics (spec.md §7 observability supplement). Registered into
//! the process-wide default registry; the binary exposes `render()` through
//! its health/metrics HTTP surface.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge, TextEncoder};

lazy_static! {
    pub static ref EVENTS_INGESTED: IntCounterVec = register_int_counter_vec!(
        "relayer_events_ingested_total",
        "Normalized chain events ingested, by chain and kind",
        &["chain", "kind"]
    )
    .expect("metric registration");
    pub static ref EVENTS_DUPLICATE: IntCounterVec = register_int_counter_vec!(
        "relayer_events_duplicate_total",
        "Events dropped as duplicates of an already-seen dedup key",
        &["chain"]
    )
    .expect("metric registration");
    pub static ref ORDERS_PENDING: IntGauge = register_int_gauge!(
        "relayer_orders_pending",
        "Orders currently held in the order table"
    )
    .expect("metric registration");
    pub static ref SUBMISSIONS_FAILED: IntCounterVec = register_int_counter_vec!(
        "relayer_submissions_failed_total",
        "Chain adapter submissions that exhausted their retries",
        &["chain"]
    )
    .expect("metric registration");
    pub static ref INVARIANT_BREACHES: IntCounterVec = register_int_counter_vec!(
        "relayer_invariant_breaches_total",
        "Orders failed due to an invariant breach, by kind",
        &["kind"]
    )
    .expect("metric registration");
}

/// Forces first-touch registration; call once from the binary's startup
/// path so the metrics appear in `render()` output even before any of them
/// are incremented.
pub fn init() {
    lazy_static::initialize(&EVENTS_INGESTED);
    lazy_static::initialize(&EVENTS_DUPLICATE);
    lazy_static::initialize(&ORDERS_PENDING);
    lazy_static::initialize(&SUBMISSIONS_FAILED);
    lazy_static::initialize(&INVARIANT_BREACHES);
}

/// Renders the default registry in Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    encoder
        .encode_to_string(&families)
        .unwrap_or_else(|_| String::new())
}
