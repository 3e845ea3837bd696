//! Per-connection relay session: join, receive loop, guaranteed cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tracing::Instrument;

use crate::broadcast::BroadcastEngine;
use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionHandle;
use crate::error::RelayError;
use crate::metrics::{HandshakeMetrics, RelayMetrics};

/// Why a message loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Client sent a close frame or the stream ended
    PeerClosed,
    /// The connection was closed from our side (pruned or shutting down)
    LocallyClosed,
    ReceiveError,
    ReceiveTimeout,
    /// A broadcast from this connection failed for at least one peer
    PeerFailure,
}

enum Received {
    Frame(Message),
    End,
    Error(RelayError),
    TimedOut,
}

/// Options that shape a session's receive loop
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub receive_timeout: Option<Duration>,
    pub terminate_sender_on_peer_failure: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            receive_timeout: None,
            terminate_sender_on_peer_failure: true,
        }
    }
}

impl From<&WebSocketConfig> for SessionOptions {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            terminate_sender_on_peer_failure: config.terminate_sender_on_peer_failure,
        }
    }
}

/// One joined connection relaying into one channel
pub struct RelaySession {
    handle: Arc<ConnectionHandle>,
    channel_id: String,
    engine: Arc<BroadcastEngine>,
    options: SessionOptions,
}

impl RelaySession {
    pub fn new(
        handle: Arc<ConnectionHandle>,
        channel_id: impl Into<String>,
        engine: Arc<BroadcastEngine>,
        options: SessionOptions,
    ) -> Self {
        Self {
            handle,
            channel_id: channel_id.into(),
            engine,
            options,
        }
    }

    /// Join the channel, run the receive loop to completion, then leave and
    /// close. Cleanup runs however the loop ends, including a panic inside it.
    pub async fn run<S, E>(self, receiver: S) -> LoopExit
    where
        S: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
        E: Into<RelayError> + Send + 'static,
    {
        let started = Instant::now();
        let registry = self.engine.registry().clone();
        let handle = self.handle.clone();
        let channel_id = self.channel_id.clone();

        registry.join(&channel_id, handle.clone()).await;
        tracing::info!("Joined channel");

        let exit = match tokio::spawn(self.receive_loop(receiver).in_current_span()).await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!(error = %e, "Message loop aborted");
                LoopExit::ReceiveError
            }
        };

        registry.leave(&channel_id, handle.id).await;
        handle.close();

        let duration = started.elapsed().as_secs_f64();
        HandshakeMetrics::record_connection_closed(duration);
        tracing::info!(exit = ?exit, duration_secs = duration, "Left channel");

        exit
    }

    async fn receive_loop<S, E>(self, mut receiver: S) -> LoopExit
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Into<RelayError>,
    {
        loop {
            let received = tokio::select! {
                _ = self.handle.closed() => return LoopExit::LocallyClosed,
                received = self.next_frame(&mut receiver) => received,
            };

            let message = match received {
                Received::Frame(message) => message,
                Received::End => return LoopExit::PeerClosed,
                Received::Error(e) => {
                    tracing::error!(error = %e, "WebSocket receive error");
                    return LoopExit::ReceiveError;
                }
                Received::TimedOut => {
                    tracing::warn!(timeout = ?self.options.receive_timeout, "Receive timed out");
                    return LoopExit::ReceiveTimeout;
                }
            };

            match message {
                Message::Text(_) | Message::Binary(_) => {
                    RelayMetrics::record_received();
                    if !self.relay(message).await {
                        return LoopExit::PeerFailure;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!("Received close frame");
                    return LoopExit::PeerClosed;
                }
                // Pings are answered by the transport
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// Broadcast one frame; false when the session should end
    async fn relay(&self, message: Message) -> bool {
        let failures = self
            .engine
            .broadcast(&self.channel_id, message, self.handle.id)
            .await;

        if failures.is_empty() {
            return true;
        }

        for (peer, error) in &failures {
            tracing::error!(peer = %peer, error = %error, "Error broadcasting to peer");
        }

        !self.options.terminate_sender_on_peer_failure
    }

    async fn next_frame<S, E>(&self, receiver: &mut S) -> Received
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Into<RelayError>,
    {
        let next = match self.options.receive_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
                Ok(next) => next,
                Err(_) => return Received::TimedOut,
            },
            None => receiver.next().await,
        };

        match next {
            Some(Ok(message)) => Received::Frame(message),
            Some(Err(e)) => match e.into() {
                RelayError::PeerClosed => {
                    tracing::debug!("Peer disconnected without a close frame");
                    Received::End
                }
                e => Received::Error(e),
            },
            None => Received::End,
        }
    }
}
