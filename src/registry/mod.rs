//! Connection registry module
//!
//! Tracks attached connections, the room each one sits in, and the user
//! identifier it joined with.

mod connection;
mod membership;
mod shared;

pub use connection::*;
pub use membership::*;
pub use shared::*;
