//! WebSocket surface: consumer connections, the fan-out hub, and the
//! upgrade handler.

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;

pub use connection::ConsumerConn;
pub use events::ClientEvent;
pub use handler::ws_handler;
pub use hub::FanoutHub;
