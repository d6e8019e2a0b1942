//! Per-consumer connection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

/// A connected downstream consumer.
///
/// Holds the sending half of the consumer's bounded outbound queue; the
/// WebSocket write task owns the receiving half. A full or closed queue
/// counts a drop against this consumer only.
pub struct ConsumerConn {
    /// Unique connection ID.
    pub id: String,
    tx: mpsc::Sender<Arc<String>>,
    /// When this consumer attached.
    pub connected_at: Instant,
    dropped: AtomicU64,
}

impl ConsumerConn {
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: format!("consumer_{}", Uuid::now_v7()),
            tx,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a serialized event for this consumer without blocking.
    ///
    /// Returns `false` if the queue is full or closed, incrementing the drop
    /// counter.
    pub fn send(&self, event: Arc<String>) -> bool {
        if self.tx.try_send(event).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Lifetime count of events dropped for this consumer.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
