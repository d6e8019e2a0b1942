//! Coordinated shutdown across the subscriber, server, and consumer pumps.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the cancellation token every long-running task watches.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The token tasks should select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown to every watcher.
    pub fn begin(&self) {
        info!("shutdown initiated");
        self.token.cancel();
    }

    /// Wait for the given tasks to finish, up to `timeout`. Tasks still
    /// running after the deadline are abandoned, not aborted, so in-flight
    /// socket closes can still complete on the runtime.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        let all = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "drain timed out");
        } else {
            info!("all tasks drained");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, watching SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}
