use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::Instrument;

use crate::connection_manager::ConnectionHandle;
use crate::error::AppError;
use crate::metrics::HandshakeMetrics;
use crate::server::AppState;

use super::message::{ErrorFrame, RequiredAttribute};
use super::origin::validate_origin;
use super::session::{RelaySession, SessionOptions};

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub username: Option<String>,
    pub channel_id: Option<String>,
}

/// Attributes of a request that passed the attribute check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub username: String,
    pub channel_id: String,
}

impl WsQuery {
    /// Both attributes must be present and non-empty; `username` is checked first.
    pub fn validate(self) -> Result<JoinRequest, RequiredAttribute> {
        let username = self
            .username
            .filter(|u| !u.is_empty())
            .ok_or(RequiredAttribute::Username)?;
        let channel_id = self
            .channel_id
            .filter(|c| !c.is_empty())
            .ok_or(RequiredAttribute::ChannelId)?;

        Ok(JoinRequest {
            username,
            channel_id,
        })
    }
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip_all,
    fields(
        remote_addr = %remote_addr,
        method = %method,
        uri = %uri,
        origin = tracing::field::Empty
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or("<non-ascii origin>"));
    if let Some(origin) = origin {
        tracing::Span::current().record("origin", origin);
    }

    if let Err(rejection) = validate_origin(origin, &state.settings.server.trusted_origins) {
        HandshakeMetrics::record_origin_rejected();
        tracing::warn!(error = %rejection, "WebSocket handshake rejected");
        return AppError::HandshakeRejected(rejection.to_string()).into_response();
    }

    let ws = match state.settings.websocket.max_message_size {
        Some(limit) => ws.max_message_size(limit),
        None => ws,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, query, remote_addr.to_string()))
}

/// Handle an upgraded connection: attribute check, then the relay session
async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery, remote_addr: String) {
    let request = match query.validate() {
        Ok(request) => request,
        Err(missing) => {
            reject_missing_attribute(socket, missing, &remote_addr).await;
            return;
        }
    };

    let (ws_sender, ws_receiver) = socket.split();
    let handle = Arc::new(ConnectionHandle::from_sink(
        request.username.clone(),
        remote_addr.clone(),
        ws_sender,
    ));

    let span = tracing::info_span!(
        "ws.connection",
        connection_id = %handle.id,
        username = %request.username,
        channel = %request.channel_id,
        remote_addr = %remote_addr,
    );

    let session = RelaySession::new(
        handle,
        request.channel_id,
        state.broadcaster.clone(),
        SessionOptions::from(&state.settings.websocket),
    );

    session.run(ws_receiver).instrument(span).await;
}

/// Send the single error frame for a missing attribute and close
async fn reject_missing_attribute(mut socket: WebSocket, missing: RequiredAttribute, remote_addr: &str) {
    HandshakeMetrics::record_missing_attribute(missing.as_str());
    tracing::warn!(
        remote_addr = %remote_addr,
        attribute = missing.as_str(),
        "Rejected connection with missing attribute"
    );

    let frame = ErrorFrame::missing_attribute(missing).to_text();
    if let Err(e) = socket.send(Message::Text(frame.into())).await {
        tracing::debug!(error = %e, "Failed to send error frame");
    }
    if let Err(e) = socket.close().await {
        tracing::debug!(error = %e, "Failed to close rejected connection");
    }
}
