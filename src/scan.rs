//! The unit of broadcast: one accepted frame plus its receive metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A validated scan ready for fan-out.
///
/// Constructed only from a frame that decoded into a non-empty point
/// sequence; dropped right after the broadcast call. The payload is the
/// original frame bytes, shared without copying.
#[derive(Debug, Clone)]
pub struct ScanBatch {
    received_at: DateTime<Utc>,
    point_count: usize,
    payload: Bytes,
}

impl ScanBatch {
    pub fn new(point_count: usize, payload: Bytes) -> Self {
        debug_assert!(point_count > 0, "empty scans are dropped before batching");
        Self {
            received_at: Utc::now(),
            point_count,
            payload,
        }
    }

    /// Wall-clock receive time as epoch milliseconds.
    pub fn timestamp_millis(&self) -> i64 {
        self.received_at.timestamp_millis()
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// The raw frame bytes, untouched.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}
