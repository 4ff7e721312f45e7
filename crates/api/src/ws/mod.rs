//! WebSocket infrastructure for pushing task feed changes to clients.
//!
//! Provides connection management, heartbeat monitoring, the HTTP upgrade
//! handler, and the outbound message types.

mod handler;
mod heartbeat;
pub mod manager;
pub mod messages;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
pub use messages::ServerMessage;
