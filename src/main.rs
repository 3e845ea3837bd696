use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;

use channel_relay::config::Settings;
use channel_relay::server::{create_app, AppState};
use channel_relay::shutdown::{GracefulShutdown, ShutdownConfig};
use channel_relay::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.logging)?;
    tracing::info!(
        trusted_origins = ?settings.server.trusted_origins,
        send_timeout_secs = ?settings.websocket.send_timeout_secs,
        receive_timeout_secs = ?settings.websocket.receive_timeout_secs,
        terminate_sender_on_peer_failure = settings.websocket.terminate_sender_on_peer_failure,
        "Configuration loaded"
    );

    // Create application state
    let state = AppState::new(settings.clone());
    let registry = state.registry.clone();

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Relay connections are drained before the listener stops
    let (drained_tx, drained_rx) = oneshot::channel::<()>();
    let shutdown = GracefulShutdown::with_config(
        registry,
        ShutdownConfig {
            drain_timeout: Duration::from_secs(settings.shutdown.drain_timeout_secs),
        },
    );
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        shutdown.execute().await;
        let _ = drained_tx.send(());
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = drained_rx.await;
    })
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
