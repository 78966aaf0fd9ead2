use std::{env, time::Duration};

/// Where the marketplace lives.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub socket_url: String,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, socket_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            socket_url: socket_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env::var("SKILLSWAP_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api".to_string()),
            env::var("SKILLSWAP_SOCKET_URL")
                .unwrap_or_else(|_| "ws://localhost:5000/ws".to_string()),
        )
    }
}

/// Timing policy of a real-time connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How long a request waits for its acknowledgement.
    pub ack_timeout: Duration,
    /// Attempts after a transport-level drop.
    pub reconnect_attempts: u32,
    /// Fixed pause before each of those attempts.
    pub reconnect_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}
