//! Shared connection registry
//!
//! The single source of truth for attached connections and room membership.
//! All state sits behind one `RwLock`: `join`, `leave` and `detach` take the
//! write lock, and fan-out snapshots are read under the read lock, so a
//! broadcast never observes a half-applied membership change.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ConnectionId, Membership, Outbound};

/// Errors that can occur during registry operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection not attached: {0}")]
    NotAttached(ConnectionId),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A room's members together with their delivery handles
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Room the snapshot was taken from
    pub room: String,
    /// Every member at the time of the snapshot
    pub recipients: Vec<(ConnectionId, Outbound)>,
}

#[derive(Debug, Default)]
struct RegistryState {
    membership: Membership,
    outbound: HashMap<ConnectionId, Outbound>,
}

/// Registry of attached connections and their room seats
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery handle of a new transport session
    pub async fn attach(&self, conn: ConnectionId, outbound: Outbound) {
        let mut state = self.state.write().await;
        state.outbound.insert(conn, outbound);
        debug!("Connection {} attached", conn);
    }

    /// Seat `conn` in `room` as `user_id`, leaving any previous room first
    ///
    /// Returns the room that was left, if any.
    pub async fn join(
        &self,
        conn: ConnectionId,
        room: &str,
        user_id: &str,
    ) -> RegistryResult<Option<String>> {
        let mut state = self.state.write().await;
        if !state.outbound.contains_key(&conn) {
            return Err(RegistryError::NotAttached(conn));
        }
        Ok(state.membership.join(conn, room, user_id))
    }

    /// Vacate the seat held by `conn`; no-op if it holds none
    pub async fn leave(&self, conn: ConnectionId) -> Option<String> {
        self.state.write().await.membership.leave(conn)
    }

    /// Leave any room and drop the delivery handle
    ///
    /// After this returns no lookup resolves `conn`.
    pub async fn detach(&self, conn: ConnectionId) -> Option<String> {
        let mut state = self.state.write().await;
        let left = state.membership.leave(conn);
        state.outbound.remove(&conn);
        debug!("Connection {} detached", conn);
        left
    }

    /// Point-in-time member set of `room`
    #[allow(dead_code)]
    pub async fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.state.read().await.membership.members_of(room)
    }

    /// Connection currently resolvable under `user_id`
    #[allow(dead_code)]
    pub async fn find_by_user_id(&self, user_id: &str) -> Option<ConnectionId> {
        self.state.read().await.membership.find_by_user_id(user_id)
    }

    /// Current room of `conn`
    #[allow(dead_code)]
    pub async fn room_of(&self, conn: ConnectionId) -> Option<String> {
        let state = self.state.read().await;
        state.membership.room_of(conn).map(str::to_string)
    }

    /// Current user id of `conn`
    #[allow(dead_code)]
    pub async fn user_of(&self, conn: ConnectionId) -> Option<String> {
        let state = self.state.read().await;
        state.membership.user_of(conn).map(str::to_string)
    }

    /// Delivery handle of `conn`
    pub async fn outbound(&self, conn: ConnectionId) -> Option<Outbound> {
        self.state.read().await.outbound.get(&conn).cloned()
    }

    /// Resolve `user_id` to a connection and its delivery handle
    pub async fn resolve_user(&self, user_id: &str) -> Option<(ConnectionId, Outbound)> {
        let state = self.state.read().await;
        let conn = state.membership.find_by_user_id(user_id)?;
        let outbound = state.outbound.get(&conn)?.clone();
        Some((conn, outbound))
    }

    /// Snapshot the room `conn` sits in, with every member's delivery handle
    ///
    /// Returns `None` if `conn` is in no room.
    pub async fn room_snapshot(&self, conn: ConnectionId) -> Option<RoomSnapshot> {
        let state = self.state.read().await;
        let room = state.membership.room_of(conn)?.to_string();
        let recipients = state
            .membership
            .members_of(&room)
            .into_iter()
            .filter_map(|member| {
                state
                    .outbound
                    .get(&member)
                    .map(|outbound| (member, outbound.clone()))
            })
            .collect();
        Some(RoomSnapshot { room, recipients })
    }

    /// Number of attached connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.outbound.len()
    }

    /// Names of all known rooms, sorted
    pub async fn room_names(&self) -> Vec<String> {
        self.state.read().await.membership.room_names()
    }
}
