//! Frame dispatcher
//!
//! Parses each inbound frame and routes it: `JOIN` to the lifecycle manager,
//! `/msg` content to the unicast router, everything else to the room
//! broadcaster. Bad frames are discarded and logged, never answered.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{DeliveryReport, LifecycleManager, RoomBroadcaster, UnicastOutcome, UnicastRouter};
use crate::protocol::{Command, ProtocolError, UnicastRequest};
use crate::registry::{ConnectionId, Registry, RegistryError};

/// What became of one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The connection took a seat, leaving `previous` if it had one
    Joined {
        room: String,
        previous: Option<String>,
    },
    /// The frame was fanned out to the sender's room
    Broadcast(DeliveryReport),
    /// A broadcast from a connection in no room; nothing was sent
    NotInRoom,
    /// A `/msg` request was routed
    Unicast(UnicastOutcome),
    /// The frame could not be parsed and was dropped
    Discarded(ProtocolError),
    /// The connection is not attached to the registry
    Rejected(RegistryError),
}

/// Routes parsed frames to the component that handles them
#[derive(Debug, Clone)]
pub struct Dispatcher {
    lifecycle: LifecycleManager,
    broadcaster: RoomBroadcaster,
    router: UnicastRouter,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`
    ///
    /// New connections get outbound queues holding `queue_capacity` frames.
    pub fn new(registry: Arc<Registry>, queue_capacity: usize) -> Self {
        Self {
            lifecycle: LifecycleManager::new(Arc::clone(&registry), queue_capacity),
            broadcaster: RoomBroadcaster::new(Arc::clone(&registry)),
            router: UnicastRouter::new(registry),
        }
    }

    /// Lifecycle manager used for connect and disconnect
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<Registry> {
        self.lifecycle.registry()
    }

    /// Handle one inbound text frame from `conn`
    pub async fn dispatch(&self, conn: ConnectionId, text: &str) -> DispatchOutcome {
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(err) => {
                warn!("Discarding frame from {}: {}", conn, err);
                return DispatchOutcome::Discarded(err);
            }
        };

        match command {
            Command::Join { room, user_id } => {
                match self.lifecycle.join(conn, &room, &user_id).await {
                    Ok(previous) => DispatchOutcome::Joined { room, previous },
                    Err(err) => {
                        warn!("Join from {} rejected: {}", conn, err);
                        DispatchOutcome::Rejected(err)
                    }
                }
            }
            Command::Message(frame) if frame.is_unicast() => {
                let request = match UnicastRequest::parse(&frame.content) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!("Discarding frame from {}: {}", conn, err);
                        return DispatchOutcome::Discarded(err);
                    }
                };
                match self.router.route(conn, &frame, &request).await {
                    Ok(outcome) => DispatchOutcome::Unicast(outcome),
                    Err(err) => {
                        warn!("Discarding frame from {}: {}", conn, err);
                        DispatchOutcome::Discarded(err)
                    }
                }
            }
            Command::Message(_) => {
                debug!("Broadcast from {}: {}", conn, text);
                match self.broadcaster.broadcast(conn, text).await {
                    Some(report) => DispatchOutcome::Broadcast(report),
                    None => DispatchOutcome::NotInRoom,
                }
            }
        }
    }
}
