use std::sync::Arc;

use crate::broadcast::BroadcastEngine;
use crate::config::Settings;
use crate::connection_manager::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<BroadcastEngine>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(BroadcastEngine::with_send_timeout(
            registry.clone(),
            settings.websocket.send_timeout(),
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            broadcaster,
        }
    }
}
