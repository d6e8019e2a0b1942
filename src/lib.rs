//! ZeroMQ to WebSocket bridge for live LIDAR scans.
//!
//! Subscribes to a publisher emitting MessagePack-encoded point
//! sequences, validates each frame, and fans accepted scans out to
//! every attached WebSocket consumer as JSON events. A `/health`
//! endpoint reports upstream connectivity and consumer count, and the
//! viewer assets are served from a static directory.

pub mod config;
pub mod decoder;
pub mod health;
pub mod scan;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod subscriber;
pub mod ws;

pub use config::BridgeConfig;
pub use scan::ScanBatch;
pub use server::{AppState, BridgeServer};
pub use shutdown::ShutdownCoordinator;
pub use state::UpstreamState;
pub use subscriber::{
    ChannelSource, FrameSource, ReconnectPolicy, UpstreamSubscriber, ZmqSource,
};
pub use ws::FanoutHub;
