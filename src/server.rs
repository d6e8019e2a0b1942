//! HTTP surface: health probe, WebSocket upgrade, and static assets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::BridgeConfig;
use crate::health::{health_check, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::state::UpstreamState;
use crate::ws::{ws_handler, FanoutHub};

/// Shared handles every request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<FanoutHub>,
    pub upstream: Arc<UpstreamState>,
    pub shutdown: ShutdownCoordinator,
    pub config: Arc<BridgeConfig>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(&state.upstream, state.hub.consumer_count()))
}

pub fn build_router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.static_dir);
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .fallback_service(assets)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct BridgeServer {
    state: AppState,
}

impl BridgeServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Bind the configured address and start serving. Returns the bound
    /// address (port 0 resolves here) and the serve task handle.
    pub async fn listen(self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.state.config.http_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "http server listening");

        let token = self.state.shutdown.token();
        let router = build_router(self.state);
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        });
        Ok((local, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut config = BridgeConfig::default();
        config.http_port = 0;
        AppState {
            hub: Arc::new(FanoutHub::new()),
            upstream: Arc::new(UpstreamState::new()),
            shutdown: ShutdownCoordinator::new(),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn health_route_reports_state() {
        let state = test_state();
        state.upstream.set_connected(true);
        let router = build_router(state);

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["zmq_connected"], true);
        assert_eq!(parsed["clients_connected"], 0);
    }

    #[tokio::test]
    async fn unknown_route_falls_through_to_assets() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::get("/no-such-page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // Default static dir is absent in unit tests, so ServeDir 404s.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let state = test_state();
        let shutdown = state.shutdown.clone();
        let (addr, handle) = BridgeServer::new(state).listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        shutdown.begin();
        handle.await.unwrap();
    }
}
