//! Upstream subscription: pulls scan frames from the publisher, decodes
//! them, and hands accepted batches to the fan-out hub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::decoder;
use crate::scan::ScanBatch;
use crate::state::UpstreamState;
use crate::ws::FanoutHub;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: zeromq::ZmqError,
    },
    #[error("receive failed: {0}")]
    Recv(#[from] zeromq::ZmqError),
    #[error("source closed")]
    Closed,
}

/// A stream of raw scan frames. The production source is ZeroMQ; tests
/// drive the bridge through [`ChannelSource`] instead.
#[async_trait]
pub trait FrameSource: Send {
    async fn connect(&mut self) -> Result<(), SourceError>;
    async fn recv(&mut self) -> Result<Bytes, SourceError>;
}

/// SUB socket with a wildcard subscription, reading whole frames.
pub struct ZmqSource {
    endpoint: String,
    socket: Option<SubSocket>,
}

impl ZmqSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            socket: None,
        }
    }
}

#[async_trait]
impl FrameSource for ZmqSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        let mut socket = SubSocket::new();
        socket
            .connect(&self.endpoint)
            .await
            .map_err(|source| SourceError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        // Empty prefix subscribes to everything the publisher emits.
        socket
            .subscribe("")
            .await
            .map_err(|source| SourceError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        info!(endpoint = %self.endpoint, "subscribed to upstream publisher");
        self.socket = Some(socket);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, SourceError> {
        let socket = self.socket.as_mut().ok_or(SourceError::Closed)?;
        let message = socket.recv().await?;
        // The payload is the final part whether or not a topic frame leads.
        message
            .into_vec()
            .pop()
            .ok_or(SourceError::Closed)
    }
}

/// In-process frame source backed by an mpsc channel. Lets tests feed the
/// bridge loop without a real publisher.
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, SourceError> {
        self.rx.recv().await.ok_or(SourceError::Closed)
    }
}

/// Bounded exponential backoff for upstream reconnects.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the given attempt (1-based): base * 2^(attempt-1),
    /// capped at 30 seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(Duration::from_secs(30))
    }
}

/// Runs the subscribe-decode-broadcast loop until cancellation or the
/// reconnect budget is spent.
pub struct UpstreamSubscriber<S: FrameSource> {
    source: S,
    hub: Arc<FanoutHub>,
    upstream: Arc<UpstreamState>,
    policy: ReconnectPolicy,
}

impl<S: FrameSource> UpstreamSubscriber<S> {
    pub fn new(
        source: S,
        hub: Arc<FanoutHub>,
        upstream: Arc<UpstreamState>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            source,
            hub,
            upstream,
            policy,
        }
    }

    /// Outer connect loop with backoff around the inner read loop. Returns
    /// Ok on cancellation, Err once reconnect attempts are exhausted.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), SourceError> {
        let mut attempt = 0u32;
        loop {
            if token.is_cancelled() {
                self.upstream.set_connected(false);
                return Ok(());
            }

            match self.source.connect().await {
                Ok(()) => {
                    attempt = 0;
                    self.upstream.set_connected(true);
                    let ended = self.read_until_closed(&token).await;
                    self.upstream.set_connected(false);
                    match ended {
                        ReadEnd::Cancelled => return Ok(()),
                        ReadEnd::SourceLost(e) => {
                            warn!(error = %e, "upstream connection lost");
                        }
                    }
                }
                Err(e) => {
                    self.upstream.set_connected(false);
                    warn!(error = %e, attempt, "upstream connect failed");
                }
            }

            attempt += 1;
            if attempt > self.policy.max_attempts {
                error!(
                    attempts = self.policy.max_attempts,
                    "reconnect budget exhausted, giving up on upstream"
                );
                return Err(SourceError::Closed);
            }
            let delay = self.policy.delay_for(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn read_until_closed(&mut self, token: &CancellationToken) -> ReadEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => return ReadEnd::Cancelled,
                frame = self.source.recv() => frame,
            };
            match frame {
                Ok(bytes) => self.handle_frame(bytes).await,
                Err(e) => return ReadEnd::SourceLost(e),
            }
        }
    }

    async fn handle_frame(&self, frame: Bytes) {
        counter!("bridge_frames_received_total").increment(1);
        match decoder::decode(&frame) {
            Ok(points) if points.is_empty() => {
                // Valid encoding, nothing to show. Skip without logging noise.
                counter!("bridge_frames_empty_total").increment(1);
            }
            Ok(points) => {
                let batch = ScanBatch::new(points.len(), frame);
                let delivered = self.hub.broadcast(&batch).await;
                debug!(
                    points = batch.point_count(),
                    consumers = delivered,
                    "broadcast scan"
                );
            }
            Err(e) => {
                counter!("bridge_frames_malformed_total").increment(1);
                warn!(error = %e, len = frame.len(), "dropping malformed frame");
            }
        }
    }
}

enum ReadEnd {
    Cancelled,
    SourceLost(SourceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestPoint {
        angle: f32,
        distance: f32,
        quality: u8,
    }

    fn frame_with_points(n: usize) -> Bytes {
        let points: Vec<TestPoint> = (0..n)
            .map(|i| TestPoint {
                angle: i as f32,
                distance: 1000.0 + i as f32,
                quality: 47,
            })
            .collect();
        Bytes::from(rmp_serde::to_vec_named(&points).unwrap())
    }

    fn subscriber_parts() -> (Arc<FanoutHub>, Arc<UpstreamState>) {
        (Arc::new(FanoutHub::new()), Arc::new(UpstreamState::new()))
    }

    async fn attach_consumer(
        hub: &Arc<FanoutHub>,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, mut rx) = mpsc::channel(64);
        hub.join(Arc::new(crate::ws::ConsumerConn::new(tx))).await;
        // Swallow the status ack.
        let _ = rx.recv().await.unwrap();
        rx
    }

    #[tokio::test]
    async fn frames_flow_to_consumers() {
        let (hub, upstream) = subscriber_parts();
        let mut rx = attach_consumer(&hub).await;

        let (tx, source) = ChannelSource::new(8);
        let token = CancellationToken::new();
        let sub = UpstreamSubscriber::new(
            source,
            Arc::clone(&hub),
            Arc::clone(&upstream),
            ReconnectPolicy::new(0, Duration::from_millis(1)),
        );
        let handle = tokio::spawn(sub.run(token.clone()));

        tx.send(frame_with_points(5)).await.unwrap();
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "lidar_scan");
        assert_eq!(parsed["pointCount"], 5);
        assert!(upstream.is_connected());

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(!upstream.is_connected());
    }

    #[tokio::test]
    async fn malformed_and_empty_frames_are_dropped() {
        let (hub, upstream) = subscriber_parts();
        let mut rx = attach_consumer(&hub).await;

        let (tx, source) = ChannelSource::new(8);
        let token = CancellationToken::new();
        let sub = UpstreamSubscriber::new(
            source,
            Arc::clone(&hub),
            upstream,
            ReconnectPolicy::new(0, Duration::from_millis(1)),
        );
        let handle = tokio::spawn(sub.run(token.clone()));

        tx.send(Bytes::from_static(&[0xc1, 0xff])).await.unwrap();
        tx.send(frame_with_points(0)).await.unwrap();
        tx.send(frame_with_points(2)).await.unwrap();

        // Only the valid non-empty frame comes through.
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["pointCount"], 2);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn source_close_flips_upstream_state() {
        let (hub, upstream) = subscriber_parts();
        let (tx, source) = ChannelSource::new(8);
        let token = CancellationToken::new();
        let sub = UpstreamSubscriber::new(
            source,
            hub,
            Arc::clone(&upstream),
            ReconnectPolicy::new(0, Duration::from_millis(1)),
        );
        let handle = tokio::spawn(sub.run(token.clone()));

        tx.send(frame_with_points(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(upstream.is_connected());

        drop(tx);
        // Zero reconnect attempts allowed: run() errors out.
        assert!(handle.await.unwrap().is_err());
        assert!(!upstream.is_connected());
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (hub, upstream) = subscriber_parts();
        let (_tx, source) = ChannelSource::new(8);
        let token = CancellationToken::new();
        let sub = UpstreamSubscriber::new(
            source,
            hub,
            upstream,
            ReconnectPolicy::new(5, Duration::from_millis(1)),
        );
        let handle = tokio::spawn(sub.run(token.clone()));
        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::new(5, Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }
}
