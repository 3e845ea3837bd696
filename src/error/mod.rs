use std::io;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};

/// Errors surfaced over plain HTTP (before or instead of a WebSocket upgrade)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transport-level failures on an established relay connection
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("connection closed")]
    Closed,

    /// The peer went away, with or without a closing handshake
    #[error("connection closed by peer")]
    PeerClosed,
}

impl From<axum::Error> for RelayError {
    fn from(e: axum::Error) -> Self {
        let inner = e.into_inner();
        if is_peer_closed(inner.as_ref()) {
            RelayError::PeerClosed
        } else {
            RelayError::Transport(inner.to_string())
        }
    }
}

/// Walk the source chain looking for a disconnect initiated by the peer
fn is_peer_closed(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(ws) = e.downcast_ref::<WsError>() {
            if matches!(
                ws,
                WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
            ) {
                return true;
            }
        }
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

impl From<futures::channel::mpsc::SendError> for RelayError {
    fn from(e: futures::channel::mpsc::SendError) -> Self {
        if e.is_disconnected() {
            RelayError::Closed
        } else {
            RelayError::Transport(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::HandshakeRejected(msg) => (
                StatusCode::FORBIDDEN,
                "HANDSHAKE_REJECTED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_rejection_is_forbidden() {
        let response = AppError::HandshakeRejected("origin not allowed: https://evil.example".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_not_found_status() {
        let response = AppError::NotFound("/nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_error_is_server_error() {
        let response = AppError::Internal("encoder failed".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_peer_disconnects_map_to_peer_closed() {
        let reset = axum::Error::new(WsError::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ));
        assert!(matches!(RelayError::from(reset), RelayError::PeerClosed));

        let closed = axum::Error::new(WsError::ConnectionClosed);
        assert!(matches!(RelayError::from(closed), RelayError::PeerClosed));

        let io_reset = axum::Error::new(WsError::Io(io::Error::from(
            io::ErrorKind::ConnectionReset,
        )));
        assert!(matches!(RelayError::from(io_reset), RelayError::PeerClosed));
    }

    #[test]
    fn test_other_receive_errors_stay_transport() {
        let err = axum::Error::new(io::Error::new(io::ErrorKind::InvalidData, "bad frame"));
        assert!(matches!(RelayError::from(err), RelayError::Transport(_)));
    }

    #[test]
    fn test_disconnected_channel_maps_to_closed() {
        let (tx, rx) = futures::channel::mpsc::channel::<u8>(1);
        drop(rx);
        let mut tx = tx;
        let err = tx.try_send(1).unwrap_err().into_send_error();
        assert!(matches!(RelayError::from(err), RelayError::Closed));
    }
}
