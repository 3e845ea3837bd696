//! End-to-end relay tests
//!
//! These tests start the real router on an ephemeral port and talk to it with
//! WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;

use channel_relay::config::Settings;
use channel_relay::server::{create_app, AppState};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the relay on a random port
async fn start_test_server(settings: Settings) -> (SocketAddr, AppState) {
    let state = AppState::new(settings);
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, query: &str) -> WsStream {
    let url = format!("ws://{}/ws?{}", addr, query);
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

async fn wait_for_members(state: &AppState, channel: &str, count: usize) {
    for _ in 0..200 {
        if state.registry.member_count(channel).await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel {} never reached {} members", channel, count);
}

async fn next_text(stream: &mut WsStream) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Expected a frame within timeout");
    match msg {
        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
        other => panic!("Expected text frame, got {:?}", other),
    }
}

// =============================================================================
// Relay Scenarios
// =============================================================================

mod relay_tests {
    use super::*;

    #[tokio::test]
    async fn test_hello_is_relayed_to_peer_only() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut a = connect(addr, "username=alice&channel_id=room1").await;
        let mut b = connect(addr, "username=bob&channel_id=room1").await;
        wait_for_members(&state, "room1", 2).await;

        a.send(Message::Text("hello".into())).await.unwrap();

        assert_eq!(next_text(&mut b).await, "hello");

        let own = tokio::time::timeout(Duration::from_millis(300), a.next()).await;
        assert!(own.is_err(), "Sender must not receive its own message");
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut a = connect(addr, "username=alice&channel_id=room1").await;
        let mut c = connect(addr, "username=carol&channel_id=room2").await;
        wait_for_members(&state, "room1", 1).await;
        wait_for_members(&state, "room2", 1).await;

        a.send(Message::Text("only room1".into())).await.unwrap();

        let other = tokio::time::timeout(Duration::from_millis(300), c.next()).await;
        assert!(other.is_err(), "Message leaked across channels");
    }

    #[tokio::test]
    async fn test_alone_in_channel_keeps_session_open() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut a = connect(addr, "username=alice&channel_id=room1").await;
        wait_for_members(&state, "room1", 1).await;

        a.send(Message::Text("anyone?".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // No peers means no failures, so the session stays joined
        assert_eq!(state.registry.member_count("room1").await, 1);
        assert_eq!(state.broadcaster.stats().total_failed, 0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_channel() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut a = connect(addr, "username=alice&channel_id=room1").await;
        let _b = connect(addr, "username=bob&channel_id=room1").await;
        wait_for_members(&state, "room1", 2).await;

        a.close(None).await.unwrap();

        wait_for_members(&state, "room1", 1).await;
    }

    #[tokio::test]
    async fn test_last_member_leaving_removes_channel() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut a = connect(addr, "username=alice&channel_id=room1").await;
        wait_for_members(&state, "room1", 1).await;

        a.close(None).await.unwrap();

        wait_for_members(&state, "room1", 0).await;
        assert!(state.registry.channel_ids().await.is_empty());
    }
}

// =============================================================================
// Handshake Scenarios
// =============================================================================

mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_channel_id_gets_error_frame() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut stream = connect(addr, "username=alice").await;

        assert_eq!(
            next_text(&mut stream).await,
            r#"{"error": "missing attribute: channel_id"}"#
        );

        // Then the server closes
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("Expected close within timeout");
        match next {
            Some(Ok(msg)) => assert!(msg.is_close(), "Expected close, got {:?}", msg),
            Some(Err(_)) | None => {}
        }

        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_username_gets_error_frame() {
        let (addr, state) = start_test_server(Settings::default()).await;

        let mut stream = connect(addr, "channel_id=room1").await;

        assert_eq!(
            next_text(&mut stream).await,
            r#"{"error": "missing attribute: username"}"#
        );
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_rejected_before_upgrade() {
        let mut settings = Settings::default();
        settings.server.trusted_origins = vec!["https://trusted.example".to_string()];
        let (addr, state) = start_test_server(settings).await;

        let mut request = format!("ws://{}/ws?username=alice&channel_id=room1", addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));

        match tokio_tungstenite::connect_async(request).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 403);
            }
            Err(other) => panic!("Expected HTTP rejection, got {:?}", other),
            Ok(_) => panic!("Upgrade should have been rejected"),
        }

        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_trusted_origin_is_accepted() {
        let mut settings = Settings::default();
        settings.server.trusted_origins = vec!["https://trusted.example".to_string()];
        let (addr, state) = start_test_server(settings).await;

        let mut request = format!("ws://{}/ws?username=alice&channel_id=room1", addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://trusted.example"));

        let (_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("Trusted origin should upgrade");

        wait_for_members(&state, "room1", 1).await;
    }
}

// =============================================================================
// HTTP Endpoints
// =============================================================================

mod api_tests {
    use super::*;

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_app(AppState::new(Settings::default()));

        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_stats_reflect_registry() {
        let (addr, state) = start_test_server(Settings::default()).await;
        let _a = connect(addr, "username=alice&channel_id=room1").await;
        wait_for_members(&state, "room1", 1).await;

        let (status, body) = get_json(create_app(state.clone()), "/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"]["total_connections"], 1);
        assert_eq!(body["connections"]["channels"]["room1"], 1);
    }

    #[tokio::test]
    async fn test_channel_detail_lists_members() {
        let (addr, state) = start_test_server(Settings::default()).await;
        let _a = connect(addr, "username=alice&channel_id=room1").await;
        wait_for_members(&state, "room1", 1).await;

        let (status, body) = get_json(create_app(state.clone()), "/api/v1/channels/room1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member_count"], 1);
        assert_eq!(body["members"][0]["username"], "alice");
        assert!(body["members"][0]["connected_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let app = create_app(AppState::new(Settings::default()));

        let (status, body) = get_json(app, "/api/v1/channels/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_app(AppState::new(Settings::default()));

        let (status, _) = get_json(app, "/does/not/exist").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
