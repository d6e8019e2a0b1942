//! Bridge configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the bridge process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// ZeroMQ publisher host to connect to.
    pub zmq_host: String,
    /// ZeroMQ publisher port.
    pub zmq_port: u16,
    /// Host to bind the HTTP/WebSocket listener on.
    pub http_host: String,
    /// Port to bind (`0` for auto-assign).
    pub http_port: u16,
    /// Root directory for static client assets.
    pub static_dir: PathBuf,
    /// Per-consumer outbound queue capacity.
    pub consumer_queue: usize,
    /// Reconnect attempts after an upstream failure before giving up.
    pub reconnect_attempts: u32,
    /// Initial reconnect backoff in milliseconds (doubles per attempt).
    pub reconnect_base_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            zmq_host: "127.0.0.1".into(),
            zmq_port: 5556,
            http_host: "0.0.0.0".into(),
            http_port: 8080,
            static_dir: PathBuf::from("static"),
            consumer_queue: 64,
            reconnect_attempts: 5,
            reconnect_base_ms: 500,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `BRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("BRIDGE_ZMQ_HOST") {
            config.zmq_host = host;
        }
        if let Some(port) = env_parse("BRIDGE_ZMQ_PORT") {
            config.zmq_port = port;
        }
        if let Ok(host) = std::env::var("BRIDGE_HTTP_HOST") {
            config.http_host = host;
        }
        if let Some(port) = env_parse("BRIDGE_HTTP_PORT") {
            config.http_port = port;
        }
        if let Ok(dir) = std::env::var("BRIDGE_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(attempts) = env_parse("BRIDGE_RECONNECT_ATTEMPTS") {
            config.reconnect_attempts = attempts;
        }
        config
    }

    /// Upstream endpoint in ZeroMQ address form.
    pub fn zmq_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.zmq_host, self.zmq_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
