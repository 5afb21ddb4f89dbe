//! In-process metrics surface for the sharing dispatcher.
//!
//! Mirrors the registry-plus-lazy_static convention used by the other
//! schedulers and cache layers in this codebase: a single
//! [`prometheus::Registry`] owned by this crate, with gauges and
//! histograms registered into it at first use. Wiring the registry to a
//! remote exporter is left to the embedding process.

use lazy_static::lazy_static;
use prometheus::*;

lazy_static! {
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("proxy_sharing".to_string()), Some(labels! {})).unwrap();
    pub static ref SEAT_WAIT_SECONDS: HistogramVec = register_histogram_vec_with_registry!(
        "seat_wait_seconds",
        "Time spent waiting for a seat to become claimable.",
        &["spec_id"],
        *REGISTRY
    )
    .unwrap();
    pub static ref SEATS_CLAIMED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "seats_claimed_total",
        "Number of seats successfully claimed.",
        &["spec_id"],
        *REGISTRY
    )
    .unwrap();
    pub static ref SEATS_RELEASED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "seats_released_total",
        "Number of seats released.",
        &["spec_id"],
        *REGISTRY
    )
    .unwrap();
    pub static ref PENDING_CLAIMS: IntGaugeVec = register_int_gauge_vec_with_registry!(
        "pending_claims",
        "Number of proxies currently waiting for a seat.",
        &["spec_id"],
        *REGISTRY
    )
    .unwrap();
    pub static ref SEATS_UNCLAIMED: IntGaugeVec = register_int_gauge_vec_with_registry!(
        "seats_unclaimed",
        "Number of seats currently free.",
        &["spec_id"],
        *REGISTRY
    )
    .unwrap();
}
