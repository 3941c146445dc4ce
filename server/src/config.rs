use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::engine::relay::RelayLimits;

/// Top-level server configuration, loaded from huddle.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerSection,
    pub relay: RelaySection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_addr: String,
    /// Origin allowed by CORS; localhost values allow any origin.
    pub public_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8765".into(),
            public_url: "http://localhost:8765".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Largest accepted inbound message, in MiB. Screen frames and voice
    /// chunks ride inside single messages, so this is generous.
    pub max_frame_mb: u64,
    /// Keep-alive ping cadence in seconds.
    pub ping_interval_secs: u64,
    /// Grace period after a missed ping, in seconds.
    pub ping_timeout_secs: u64,
    /// Stored text messages per guild; 0 disables the cap.
    pub history_limit: usize,
    pub max_message_length: usize,
    /// Frames queued per session before deliveries start dropping.
    pub outbound_queue: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            max_frame_mb: 50,
            ping_interval_secs: 20,
            ping_timeout_secs: 10,
            history_limit: 500,
            max_message_length: 4000,
            outbound_queue: 1024,
        }
    }
}

impl RelayConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        // PORT rebinds just the port, for container platforms that inject it.
        if let Ok(v) = std::env::var("PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            let host = self
                .server
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".into());
            self.server.listen_addr = format!("{host}:{port}");
        }
        if let Ok(v) = std::env::var("PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Ok(v) = std::env::var("MAX_FRAME_MB")
            && let Ok(mb) = v.parse()
        {
            self.relay.max_frame_mb = mb;
        }
        if let Ok(v) = std::env::var("HISTORY_LIMIT")
            && let Ok(limit) = v.parse()
        {
            self.relay.history_limit = limit;
        }
        if let Ok(v) = std::env::var("MAX_MESSAGE_LENGTH")
            && let Ok(len) = v.parse()
        {
            self.relay.max_message_length = len;
        }
    }

    /// Convert into the engine's limit set.
    pub fn to_limits(&self) -> RelayLimits {
        RelayLimits {
            outbound_queue: self.relay.outbound_queue,
            history_limit: self.relay.history_limit,
            max_message_length: self.relay.max_message_length,
        }
    }
}
