//! Configuration module
//!
//! Handles loading listener and queue settings for the relay and its
//! companion servers.

mod relay;

pub use relay::*;
