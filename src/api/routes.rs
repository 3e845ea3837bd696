use axum::{routing::get, Router};

use crate::server::AppState;
use crate::websocket::ws_handler;

use super::connection::{get_channel, list_channels};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/ws", get(ws_handler))
                .route("/channels", get(list_channels))
                .route("/channels/{channel_id}", get(get_channel)),
        )
}
