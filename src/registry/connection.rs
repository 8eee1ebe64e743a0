//! Connection identity and outbound delivery
//!
//! Every transport session is keyed by an opaque [`ConnectionId`]. Frames reach
//! the session through an [`Outbound`] handle wrapping a bounded queue that the
//! session's writer drains, so a slow peer can only ever fill its own queue.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default number of frames buffered per connection before delivery fails
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Errors that can occur when handing a frame to a single recipient
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Connection is closed")]
    Closed,
}

/// Result type for delivery operations
pub type DeliveryResult = Result<(), DeliveryError>;

/// Opaque identifier for one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[allow(dead_code)]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Send half of a connection's outbound queue
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
}

impl Outbound {
    /// Create an outbound handle and the receiver the transport drains
    ///
    /// A capacity of zero is bumped to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a frame without waiting
    pub fn try_deliver(&self, frame: &str) -> DeliveryResult {
        self.tx.try_send(frame.to_owned()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Whether the transport side has gone away
    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
