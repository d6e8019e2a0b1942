//! WebSocket upgrade endpoint and per-connection pump.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::connection::ConsumerConn;
use crate::server::AppState;

/// GET /ws -> upgrade and attach to the fan-out hub.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.config.consumer_queue);
    let conn = Arc::new(ConsumerConn::new(tx));
    let id = conn.id.clone();
    let connected_at = conn.connected_at;

    state.hub.join(conn).await;
    counter!("bridge_consumer_connects_total").increment(1);
    info!(consumer = %id, total = state.hub.consumer_count(), "consumer connected");

    let (mut sender, mut receiver) = socket.split();
    let token = state.shutdown.token();

    // Writer: drain the hub queue onto the socket until the queue closes,
    // the socket errors, or shutdown fires.
    let writer = async {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                event = rx.recv() => match event {
                    Some(json) => {
                        if sender.send(Message::Text(json.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Hub evicted us (slow consumer or close_all).
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    };

    // Reader: consumers send nothing meaningful; watch for close/error so
    // departures are noticed even when no scans are flowing.
    let reader = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(other) => debug!(consumer = %id, ?other, "ignoring inbound message"),
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    state.hub.leave(&id).await;
    counter!("bridge_consumer_disconnects_total").increment(1);
    info!(
        consumer = %id,
        total = state.hub.consumer_count(),
        session_secs = connected_at.elapsed().as_secs(),
        "consumer disconnected"
    );
}
