//! Unicast router
//!
//! Resolves a user identifier to a connection and delivers a point-to-point
//! exchange: a `To` confirmation for the sender and a `From` frame for the
//! target. Unknown targets get a system error frame back to the sender.

use std::sync::Arc;

use tracing::{debug, info};

use super::DeliveryReport;
use crate::protocol::{MessageFrame, ProtocolResult, UnicastRequest};
use crate::registry::{ConnectionId, Registry};

/// Result of routing a unicast request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnicastOutcome {
    /// The target resolved; both frames were handed to their queues
    Delivered {
        target: ConnectionId,
        report: DeliveryReport,
    },
    /// No connection holds the target id; the sender got an error frame
    TargetNotFound { report: DeliveryReport },
}

/// Routes `/msg` requests between users
#[derive(Debug, Clone)]
pub struct UnicastRouter {
    registry: Arc<Registry>,
}

impl UnicastRouter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver `request` from `sender`
    ///
    /// The sender name in outbound frames is the user id carried in `frame`.
    pub async fn route(
        &self,
        sender: ConnectionId,
        frame: &MessageFrame,
        request: &UnicastRequest,
    ) -> ProtocolResult<UnicastOutcome> {
        let sender_outbound = self.registry.outbound(sender).await;
        let mut report = DeliveryReport::new();

        let Some((target, target_outbound)) = self.registry.resolve_user(&request.target).await
        else {
            debug!(
                "Unicast from {} to unknown user '{}'",
                frame.user_id, request.target
            );
            let reply = MessageFrame::target_not_found(&frame.timestamp).encode()?;
            if let Some(outbound) = &sender_outbound {
                report.deliver(sender, outbound, &reply);
            }
            return Ok(UnicastOutcome::TargetNotFound { report });
        };

        let to_sender = MessageFrame::unicast_to_sender(
            &frame.user_id,
            &frame.timestamp,
            &request.target,
            &request.text,
        )
        .encode()?;
        let to_target =
            MessageFrame::unicast_to_target(&frame.user_id, &frame.timestamp, &request.text)
                .encode()?;

        if let Some(outbound) = &sender_outbound {
            report.deliver(sender, outbound, &to_sender);
        }
        report.deliver(target, &target_outbound, &to_target);

        info!("Unicast {} -> {}", frame.user_id, request.target);
        Ok(UnicastOutcome::Delivered { target, report })
    }
}
