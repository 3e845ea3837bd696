use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde::Serialize;
use uuid::Uuid;

use crate::connection_manager::ConnectionRegistry;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;

/// Per-peer send failures of one broadcast, keyed by the peer's remote address
pub type BroadcastFailures = HashMap<String, RelayError>;

/// Statistics for the broadcast engine
#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub total_broadcasts: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_pruned: AtomicU64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_pruned: self.total_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of broadcast statistics
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatsSnapshot {
    pub total_broadcasts: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub total_pruned: u64,
}

/// Relays frames to the other members of a channel
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Option<Duration>,
    stats: BroadcastStats,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            send_timeout: None,
            stats: BroadcastStats::default(),
        }
    }

    /// Bound every individual peer send by `send_timeout`
    pub fn with_send_timeout(registry: Arc<ConnectionRegistry>, send_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            send_timeout,
            stats: BroadcastStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send `message` to every member of `channel_id` except `sender`.
    ///
    /// Peers are sent to one after another from a snapshot, so no lock is
    /// held during I/O. A failed peer is closed and recorded, and the fan-out
    /// carries on; all failed peers are then removed in one batch. The
    /// returned map is empty when every send succeeded.
    #[tracing::instrument(
        name = "broadcast.channel",
        skip(self, message),
        fields(peers = tracing::field::Empty)
    )]
    pub async fn broadcast(&self, channel_id: &str, message: Message, sender: Uuid) -> BroadcastFailures {
        let peers = self.registry.snapshot(channel_id, sender).await;
        tracing::Span::current().record("peers", peers.len());
        self.stats.total_broadcasts.fetch_add(1, Ordering::Relaxed);

        let mut failures = BroadcastFailures::new();
        let mut failed_ids = Vec::new();
        let mut delivered = 0u64;

        for peer in &peers {
            match peer.send_with_timeout(message.clone(), self.send_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %peer.id,
                        remote_addr = %peer.remote_addr,
                        error = %e,
                        "Send to peer failed"
                    );
                    peer.close();
                    failed_ids.push(peer.id);
                    failures.insert(peer.remote_addr.clone(), e);
                }
            }
        }

        let pruned = self.registry.remove_members(channel_id, &failed_ids).await as u64;

        self.stats.total_delivered.fetch_add(delivered, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed_ids.len() as u64, Ordering::Relaxed);
        self.stats.total_pruned.fetch_add(pruned, Ordering::Relaxed);
        RelayMetrics::record_relayed(delivered);
        RelayMetrics::record_failed(failed_ids.len() as u64);
        RelayMetrics::record_pruned(pruned);

        failures
    }
}
