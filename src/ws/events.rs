//! Wire events pushed to WebSocket consumers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::scan::ScanBatch;

/// One event on the downstream push channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Sent once per consumer, on connect, before any scan data.
    Status { message: String, timestamp: String },
    /// One per accepted scan batch. `points` carries the original frame
    /// bytes base64-encoded; the bridge never re-encodes point data.
    LidarScan {
        timestamp: i64,
        #[serde(rename = "pointCount")]
        point_count: usize,
        points: String,
    },
}

impl ClientEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn scan(batch: &ScanBatch) -> Self {
        Self::LidarScan {
            timestamp: batch.timestamp_millis(),
            point_count: batch.point_count(),
            points: BASE64.encode(batch.payload()),
        }
    }
}
