use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scanbridge::{
    AppState, BridgeConfig, BridgeServer, FanoutHub, ReconnectPolicy, ShutdownCoordinator,
    UpstreamState, UpstreamSubscriber, ZmqSource,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(BridgeConfig::from_env());
    info!(
        zmq = %config.zmq_endpoint(),
        http = %config.http_addr(),
        "starting scan bridge"
    );

    let hub = Arc::new(FanoutHub::new());
    let upstream = Arc::new(UpstreamState::new());
    let shutdown = ShutdownCoordinator::new();

    // Bind the listener before touching upstream so the health probe is
    // reachable even while the publisher is down.
    let state = AppState {
        hub: Arc::clone(&hub),
        upstream: Arc::clone(&upstream),
        shutdown: shutdown.clone(),
        config: Arc::clone(&config),
    };
    let (_addr, server_handle) = BridgeServer::new(state)
        .listen()
        .await
        .context("failed to bind http listener")?;

    let source = ZmqSource::new(config.zmq_endpoint());
    let policy = ReconnectPolicy::new(config.reconnect_attempts, config.reconnect_base());
    let subscriber = UpstreamSubscriber::new(
        source,
        Arc::clone(&hub),
        Arc::clone(&upstream),
        policy,
    );
    let sub_token = shutdown.token();
    let sub_handle = tokio::spawn(async move {
        if let Err(e) = subscriber.run(sub_token).await {
            tracing::error!(error = %e, "upstream subscriber stopped");
        }
    });

    scanbridge::shutdown::wait_for_signal().await;

    shutdown.begin();
    hub.close_all().await;
    shutdown
        .drain(vec![server_handle, sub_handle], DRAIN_TIMEOUT)
        .await;
    info!("scan bridge stopped");
    Ok(())
}
