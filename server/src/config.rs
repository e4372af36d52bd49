//! Server configuration.

use snake_shared::{DEFAULT_PORT, MAX_CONNECTIONS, MAX_SESSIONS, TICK_MS};
use std::time::Duration;

/// Snapshots queued per connection before new ones are dropped.
const OUTBOUND_QUEUE: usize = 8;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Period between two simulation steps of a session.
    pub tick: Duration,
    pub max_sessions: usize,
    pub max_connections: usize,
    pub outbound_queue: usize,
    /// Fixed seed for the per-session random sources; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick: Duration::from_millis(TICK_MS),
            max_sessions: MAX_SESSIONS,
            max_connections: MAX_CONNECTIONS,
            outbound_queue: OUTBOUND_QUEUE,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
