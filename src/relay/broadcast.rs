//! Room broadcaster
//!
//! Fans a frame out to every member of the sender's current room, the sender
//! included.

use std::sync::Arc;

use tracing::debug;

use super::DeliveryReport;
use crate::registry::{ConnectionId, Registry};

/// Delivers frames to everyone in the sender's room
#[derive(Debug, Clone)]
pub struct RoomBroadcaster {
    registry: Arc<Registry>,
}

impl RoomBroadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver `frame` unchanged to every member of the sender's room
    ///
    /// Returns `None` without delivering anything if the sender is in no room.
    pub async fn broadcast(&self, sender: ConnectionId, frame: &str) -> Option<DeliveryReport> {
        let Some(snapshot) = self.registry.room_snapshot(sender).await else {
            debug!("Connection {} is not in a room, dropping broadcast", sender);
            return None;
        };

        let mut report = DeliveryReport::new();
        for (conn, outbound) in &snapshot.recipients {
            report.deliver(*conn, outbound, frame);
        }

        debug!(
            "Broadcast in {} reached {}/{} members",
            snapshot.room,
            report.delivered.len(),
            snapshot.recipients.len()
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::{DeliveryError, Outbound};

    async fn joined(
        registry: &Registry,
        room: &str,
        user_id: &str,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let conn = ConnectionId::new();
        let (outbound, rx) = Outbound::channel(capacity);
        registry.attach(conn, outbound).await;
        registry.join(conn, room, user_id).await.unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_room_including_sender() {
        let registry = Arc::new(Registry::new());
        let (a, mut rx_a) = joined(&registry, "room1", "alice", 8).await;
        let (_b, mut rx_b) = joined(&registry, "room1", "bob", 8).await;
        let (_c, mut rx_c) = joined(&registry, "room2", "carol", 8).await;
        let broadcaster = RoomBroadcaster::new(Arc::clone(&registry));

        let report = broadcaster.broadcast(a, "alice|t1|TEXT|hello").await.unwrap();

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "alice|t1|TEXT|hello");
        assert_eq!(rx_b.try_recv().unwrap(), "alice|t1|TEXT|hello");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_from_unjoined_sender_is_dropped() {
        let registry = Arc::new(Registry::new());
        let (_a, mut rx_a) = joined(&registry, "room1", "alice", 8).await;
        let loner = ConnectionId::new();
        let (outbound, _rx) = Outbound::channel(8);
        registry.attach(loner, outbound).await;
        let broadcaster = RoomBroadcaster::new(Arc::clone(&registry));

        assert!(broadcaster.broadcast(loner, "x|t|TEXT|hi").await.is_none());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block_others() {
        let registry = Arc::new(Registry::new());
        let (a, mut rx_a) = joined(&registry, "room1", "alice", 8).await;
        let (slow, _rx_slow) = joined(&registry, "room1", "slow", 1).await;
        registry
            .outbound(slow)
            .await
            .unwrap()
            .try_deliver("backlog")
            .unwrap();
        let broadcaster = RoomBroadcaster::new(Arc::clone(&registry));

        let report = broadcaster.broadcast(a, "alice|t1|TEXT|hello").await.unwrap();

        assert!(report.reached(a));
        assert_eq!(report.failed, vec![(slow, DeliveryError::QueueFull)]);
        assert_eq!(rx_a.try_recv().unwrap(), "alice|t1|TEXT|hello");
    }
}
