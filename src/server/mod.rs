//! Network servers
//!
//! The WebSocket room relay plus the optional TCP echo relay and the HTTP
//! bridge that feeds it.

mod bridge;
mod echo;
mod websocket;

pub use bridge::*;
pub use echo::*;
pub use websocket::*;
