//! Wire protocol module
//!
//! Parses inbound text frames into commands and builds the outbound frames the
//! relay sends back.

mod frame;
mod unicast;

pub use frame::*;
pub use unicast::*;
