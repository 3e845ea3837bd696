//! Channel inspection endpoints.

use axum::{
    extract::{OriginalUri, Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::{ChannelDetail, ChannelInfo};
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelInfo>,
    pub total_channels: usize,
}

/// GET /api/v1/channels - List all channels with member counts
pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelListResponse> {
    let channels = state.registry.list_channels().await;
    let total = channels.len();

    Json(ChannelListResponse {
        channels,
        total_channels: total,
    })
}

/// GET /api/v1/channels/{channel_id} - Get channel details with its members
pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelDetail>> {
    state
        .registry
        .channel_detail(&channel_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Channel '{}' has no members", channel_id)))
}

/// Fallback for unknown routes
pub async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
