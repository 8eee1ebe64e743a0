//! Connection lifecycle
//!
//! Handles connect, join, leave and disconnect events. Joining another room
//! always leaves the current one first, and a disconnect leaves no trace of the
//! connection in the registry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::registry::{ConnectionId, Outbound, Registry, RegistryResult};

/// Drives connections through connect, join, leave and disconnect
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    registry: Arc<Registry>,
    queue_capacity: usize,
}

impl LifecycleManager {
    pub fn new(registry: Arc<Registry>, queue_capacity: usize) -> Self {
        Self {
            registry,
            queue_capacity,
        }
    }

    /// Register a new transport session
    ///
    /// Returns its identifier and the receiver the transport writer drains.
    /// The connection is in no room until it joins.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let conn = ConnectionId::new();
        let (outbound, rx) = Outbound::channel(self.queue_capacity);
        self.registry.attach(conn, outbound).await;
        info!("Connection established: {}", conn);
        (conn, rx)
    }

    /// Seat `conn` in `room` as `user_id`
    pub async fn join(
        &self,
        conn: ConnectionId,
        room: &str,
        user_id: &str,
    ) -> RegistryResult<Option<String>> {
        let previous = self.registry.join(conn, room, user_id).await?;
        if let Some(previous) = &previous {
            info!("Connection {} left room {}", conn, previous);
        }
        info!("User {} ({}) joined room {}", user_id, conn, room);
        Ok(previous)
    }

    /// Vacate the room held by `conn`, if any
    #[allow(dead_code)]
    pub async fn leave(&self, conn: ConnectionId) -> Option<String> {
        let left = self.registry.leave(conn).await;
        if let Some(room) = &left {
            info!("Connection {} left room {}", conn, room);
        }
        left
    }

    /// Remove every trace of `conn`; safe to call more than once
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<String> {
        let left = self.registry.detach(conn).await;
        match &left {
            Some(room) => info!("Connection closed: {} (left room {})", conn, room),
            None => info!("Connection closed: {}", conn),
        }
        left
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
