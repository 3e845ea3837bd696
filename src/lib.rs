// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Relay core
pub mod broadcast;
pub mod connection_manager;
pub mod websocket;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod telemetry;
