//! WebSocket Gateway
//!
//! Real-time presence, fan-out and intents over WebSocket connections.

pub mod gateway;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod session;

pub use gateway::{ChannelKey, ConnectedSession, Gateway};
pub use handler::ws_handler;
pub use hub::Hub;
pub use messages::{ClientIntent, ServerEvent};
pub use session::{ConnectionState, SessionState};
