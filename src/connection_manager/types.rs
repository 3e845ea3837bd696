//! Connection handle and related types

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::error::RelayError;

/// Outgoing half of a peer connection, type-erased so the registry does not
/// care whether it wraps a real WebSocket or an in-memory channel.
pub type MessageSink = Pin<Box<dyn Sink<Message, Error = RelayError> + Send>>;

/// Upper bound for flushing a close frame to a peer after `close()`
const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle for a single relay connection.
///
/// The registry only stores `Arc<ConnectionHandle>`s; the message loop that
/// created the handle owns the connection's lifetime and closes it on exit.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub username: String,
    /// Remote socket address, used to key broadcast failures
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
    sink: Arc<Mutex<MessageSink>>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(
        username: impl Into<String>,
        remote_addr: impl Into<String>,
        sink: MessageSink,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            remote_addr: remote_addr.into(),
            connected_at: Utc::now(),
            sink: Arc::new(Mutex::new(sink)),
            closed,
        }
    }

    /// Build a handle from any sink whose error converts into [`RelayError`].
    pub fn from_sink<S, E>(
        username: impl Into<String>,
        remote_addr: impl Into<String>,
        sink: S,
    ) -> Self
    where
        S: Sink<Message, Error = E> + Send + 'static,
        E: Into<RelayError>,
    {
        let sink = sink.sink_map_err(|e: E| -> RelayError { e.into() });
        Self::new(username, remote_addr, Box::pin(sink))
    }

    pub fn is_alive(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Send one frame, waiting for the sink to accept it.
    ///
    /// Concurrent senders to the same peer are serialized on the sink lock.
    /// A send still in flight when the connection is closed is abandoned and
    /// returns [`RelayError::Closed`].
    pub async fn send(&self, message: Message) -> Result<(), RelayError> {
        if !self.is_alive() {
            return Err(RelayError::Closed);
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(message).await
        };

        tokio::select! {
            result = write => result,
            _ = self.closed() => Err(RelayError::Closed),
        }
    }

    /// Like [`send`](Self::send) but gives up after `limit` when one is set.
    pub async fn send_with_timeout(
        &self,
        message: Message,
        limit: Option<Duration>,
    ) -> Result<(), RelayError> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.send(message))
                .await
                .map_err(|_| RelayError::SendTimeout(limit))?,
            None => self.send(message).await,
        }
    }

    /// Mark the connection closed and close its sink. Idempotent.
    ///
    /// Returns as soon as the flag is set. The owning message loop and any
    /// in-flight send observe it through [`closed`](Self::closed); the sink
    /// itself is closed in the background, bounded by `SINK_CLOSE_TIMEOUT`,
    /// so a stalled peer never blocks the caller.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        let sink = self.sink.clone();
        let connection_id = self.id;
        tokio::spawn(async move {
            let close = async {
                let mut sink = sink.lock().await;
                sink.close().await
            };
            match tokio::time::timeout(SINK_CLOSE_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Error while closing sink");
                }
                Err(_) => {
                    tracing::debug!(connection_id = %connection_id, "Timed out closing sink");
                }
            }
        });
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so the channel cannot be dropped here
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("remote_addr", &self.remote_addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::test_support::{memory_connection, stalled_connection};
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_frame() {
        let (handle, mut rx) = memory_connection("alice", "127.0.0.1:1000");

        handle.send(Message::Text("hi".into())).await.unwrap();

        match rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "hi"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_fails_when_peer_gone() {
        let (handle, rx) = memory_connection("alice", "127.0.0.1:1000");
        drop(rx);

        let result = handle.send(Message::Text("hi".into())).await;
        assert!(matches!(result, Err(RelayError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_observable() {
        let (handle, mut rx) = memory_connection("alice", "127.0.0.1:1000");
        assert!(handle.is_alive());

        handle.close();
        handle.close();

        assert!(!handle.is_alive());
        // Already closed, so this resolves immediately
        handle.closed().await;
        // Closing the sink ends the receiving stream
        assert!(rx.next().await.is_none());
        assert!(matches!(
            handle.send(Message::Text("late".into())).await,
            Err(RelayError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_closed_resolves_only_after_close() {
        let (handle, _rx) = memory_connection("alice", "127.0.0.1:1000");

        let mut waiter = task::spawn(handle.closed());
        assert_pending!(waiter.poll());

        handle.close();

        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_close_abandons_stalled_send() {
        let handle = stalled_connection("slow", "10.0.0.9:1");

        let sender = handle.clone();
        let in_flight =
            tokio::spawn(async move { sender.send(Message::Text("stuck".into())).await });
        // Let the send take the sink lock and stall on it
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!in_flight.is_finished());

        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(2), in_flight)
            .await
            .expect("stalled send should end once the connection is closed")
            .unwrap();
        assert!(matches!(result, Err(RelayError::Closed)));
    }
}
