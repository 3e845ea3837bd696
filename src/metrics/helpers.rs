//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CHANNELS_ACTIVE, CONNECTIONS_ACTIVE, CONNECTION_DURATION, HANDSHAKE_REJECTIONS_TOTAL,
    MESSAGES_RECEIVED_TOTAL, MESSAGES_RELAYED_TOTAL, PEERS_PRUNED_TOTAL, SEND_FAILURES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for registry gauges
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub fn set_sizes(connections: usize, channels: usize) {
        CONNECTIONS_ACTIVE.set(connections as i64);
        CHANNELS_ACTIVE.set(channels as i64);
    }
}

/// Helper struct for recording relay traffic
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_received() {
        MESSAGES_RECEIVED_TOTAL.inc();
    }

    pub fn record_relayed(count: u64) {
        MESSAGES_RELAYED_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        SEND_FAILURES_TOTAL.inc_by(count);
    }

    pub fn record_pruned(count: u64) {
        PEERS_PRUNED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording handshake outcomes
pub struct HandshakeMetrics;

impl HandshakeMetrics {
    pub fn record_origin_rejected() {
        HANDSHAKE_REJECTIONS_TOTAL
            .with_label_values(&["origin"])
            .inc();
    }

    pub fn record_missing_attribute(attribute: &str) {
        HANDSHAKE_REJECTIONS_TOTAL
            .with_label_values(&[attribute])
            .inc();
    }

    pub fn record_connection_closed(duration_secs: f64) {
        CONNECTION_DURATION.observe(duration_secs);
    }
}
