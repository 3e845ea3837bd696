//! Graceful shutdown for the relay.
//!
//! Closing a connection ends its message loop, which leaves the channel. So
//! shutdown closes every registered connection and then waits, bounded by
//! the drain timeout, for the registry to empty. The listener keeps
//! accepting while this runs, so connections that join during the drain are
//! closed as they show up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::connection_manager::ConnectionRegistry;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for sessions to leave their channels (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Handles graceful shutdown of the relay
pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            config: ShutdownConfig::default(),
        }
    }

    pub fn with_config(registry: Arc<ConnectionRegistry>, config: ShutdownConfig) -> Self {
        Self { registry, config }
    }

    /// Close every connection and wait for the registry to drain
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self) -> ShutdownResult {
        let start = std::time::Instant::now();

        let connections = self.registry.all_connections().await;
        let initial = connections.len();
        tracing::info!(total_connections = initial, "Closing relay connections");

        for conn in &connections {
            conn.close();
        }

        let drained = self.wait_for_drain().await;
        let remaining = self.registry.stats().await.total_connections;

        if !drained {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not leave before the drain timeout"
            );
        }

        let result = ShutdownResult {
            drained,
            connections_closed: initial.saturating_sub(remaining),
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_closed = result.connections_closed,
            drained = result.drained,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    async fn wait_for_drain(&self) -> bool {
        let wait_future = async {
            loop {
                let remaining = self.registry.all_connections().await;
                if remaining.is_empty() {
                    break;
                }
                // Late joiners
                for conn in remaining.iter().filter(|conn| conn.is_alive()) {
                    tracing::debug!(connection_id = %conn.id, "Closing connection joined during shutdown");
                    conn.close();
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        timeout(self.config.drain_timeout, wait_future).await.is_ok()
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every connection left before the timeout
    pub drained: bool,
    pub connections_closed: usize,
    pub duration: Duration,
}
