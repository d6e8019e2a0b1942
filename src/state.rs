//! Shared upstream connection state.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide upstream connection flag.
///
/// Single writer (the subscriber), any number of readers (health endpoint,
/// logging). True only between a successful subscribe handshake and the
/// first detected transport failure.
#[derive(Debug, Default)]
pub struct UpstreamState {
    connected: AtomicBool,
}

impl UpstreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
