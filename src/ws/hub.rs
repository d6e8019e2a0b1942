//! Scan fan-out to connected consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ConsumerConn;
use super::events::ClientEvent;
use crate::scan::ScanBatch;

/// Maximum lifetime event drops before a slow consumer is forcibly removed.
const MAX_TOTAL_DROPS: u64 = 100;

/// Fraction of broadcasts that emit a diagnostic summary line.
const DIAG_SAMPLE_RATE: f64 = 0.01;

/// Tracks the consumer set and broadcasts accepted scans to all of it.
pub struct FanoutHub {
    consumers: RwLock<HashMap<String, Arc<ConsumerConn>>>,
    /// Atomic count so health checks never take the lock.
    active: AtomicUsize,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// Register a consumer and send its `status` acknowledgment. The ack is
    /// queued before any scan can reach this consumer.
    pub async fn join(&self, conn: Arc<ConsumerConn>) {
        let ack = ClientEvent::status("connected to scan bridge");
        match serde_json::to_string(&ack) {
            Ok(json) => {
                let _ = conn.send(Arc::new(json));
            }
            Err(e) => warn!(error = %e, "failed to serialize status ack"),
        }

        let mut consumers = self.consumers.write().await;
        if consumers.insert(conn.id.clone(), conn).is_none() {
            let _ = self.active.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Deregister a consumer. Idempotent; unknown IDs are a no-op.
    pub async fn leave(&self, id: &str) {
        let mut consumers = self.consumers.write().await;
        if consumers.remove(id).is_some() {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Number of attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Broadcast one batch to every consumer. Returns the number of
    /// consumers the event was queued for.
    ///
    /// With zero consumers this returns before serializing anything. The
    /// event is serialized once and shared across consumers; delivery to
    /// each is independent and never blocks the caller.
    pub async fn broadcast(&self, batch: &ScanBatch) -> usize {
        if self.consumer_count() == 0 {
            return 0;
        }

        let event = ClientEvent::scan(batch);
        let json = match serde_json::to_string(&event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize scan event");
                return 0;
            }
        };

        let mut delivered = 0usize;
        let mut to_evict = Vec::new();
        {
            let consumers = self.consumers.read().await;
            for conn in consumers.values() {
                if conn.send(Arc::clone(&json)) {
                    delivered += 1;
                } else {
                    counter!("bridge_broadcast_drops_total").increment(1);
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(consumer = %conn.id, drops, "evicting slow consumer");
                        to_evict.push(conn.id.clone());
                    } else {
                        debug!(consumer = %conn.id, drops, "consumer queue full, scan dropped");
                    }
                }
            }
        }
        for id in &to_evict {
            self.leave(id).await;
        }

        if rand::random_bool(DIAG_SAMPLE_RATE) {
            info!(
                points = batch.point_count(),
                consumers = delivered,
                "scan broadcast sample"
            );
        }

        delivered
    }

    /// Drop every consumer, closing their outbound queues.
    pub async fn close_all(&self) {
        let mut consumers = self.consumers.write().await;
        let removed = consumers.len();
        consumers.clear();
        let _ = self.active.fetch_sub(removed, Ordering::Relaxed);
        if removed > 0 {
            info!(consumers = removed, "closed all consumer connections");
        }
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
