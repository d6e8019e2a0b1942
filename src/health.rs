//! `/health` endpoint.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::UpstreamState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Whether the upstream ZeroMQ subscription is currently live.
    pub zmq_connected: bool,
    /// Number of attached WebSocket consumers.
    pub clients_connected: usize,
    /// ISO-8601 timestamp of this snapshot.
    pub timestamp: String,
}

/// Build a health response from live state. Pure snapshot read; never blocks
/// on subscriber or hub internals.
pub fn health_check(upstream: &UpstreamState, clients_connected: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        zmq_connected: upstream.is_connected(),
        clients_connected,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}
