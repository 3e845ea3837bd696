//! API layer - HTTP endpoint handlers.

mod connection;
mod health;
mod metrics;
mod routes;

pub use connection::{get_channel, list_channels, not_found};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
