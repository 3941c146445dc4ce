use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::engine::relay::RelayEngine;

/// Shared state handed to every axum handler.
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    /// Largest accepted inbound WebSocket message (screen frames are big).
    pub max_frame_bytes: usize,
    /// Keep-alive ping cadence.
    pub ping_interval: Duration,
    /// Grace period after a missed ping before the connection is dropped.
    pub ping_timeout: Duration,
    pub public_url: String,
}

impl AppState {
    pub fn new(engine: Arc<RelayEngine>, config: &RelayConfig) -> Self {
        Self {
            engine,
            max_frame_bytes: (config.relay.max_frame_mb as usize) * 1024 * 1024,
            ping_interval: Duration::from_secs(config.relay.ping_interval_secs),
            ping_timeout: Duration::from_secs(config.relay.ping_timeout_secs),
            public_url: config.server.public_url.clone(),
        }
    }
}
