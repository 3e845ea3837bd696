//! Prometheus metrics for the relay.
//!
//! - Registry metrics (active connections, active channels)
//! - Relay metrics (messages received, relayed, failed sends, pruned peers)
//! - Handshake metrics (rejections by reason, connection lifetimes)

mod helpers;

pub use helpers::{encode_metrics, HandshakeMetrics, RegistryMetrics, RelayMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Registry Metrics
    // ============================================================================

    /// Connections currently joined to a channel
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of connections currently joined to a channel"
    ).unwrap();

    /// Channels with at least one member
    pub static ref CHANNELS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_channels_active", METRIC_PREFIX),
        "Number of channels with at least one member"
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_received_total", METRIC_PREFIX),
        "Frames received from clients for relaying"
    ).unwrap();

    pub static ref MESSAGES_RELAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_relayed_total", METRIC_PREFIX),
        "Frames successfully delivered to channel peers"
    ).unwrap();

    pub static ref SEND_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_send_failures_total", METRIC_PREFIX),
        "Failed sends to channel peers during broadcast"
    ).unwrap();

    pub static ref PEERS_PRUNED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_peers_pruned_total", METRIC_PREFIX),
        "Peers removed from the registry after a failed send"
    ).unwrap();

    // ============================================================================
    // Handshake Metrics
    // ============================================================================

    pub static ref HANDSHAKE_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_handshake_rejections_total", METRIC_PREFIX),
        "Upgrade requests refused before joining a channel",
        &["reason"]
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Lifetime of joined relay connections",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();
}
