//! Per-recipient delivery accounting

use tracing::{debug, warn};

use crate::registry::{ConnectionId, DeliveryError, Outbound};

/// Outcome of handing one frame to a set of recipients
///
/// A failure for one recipient never stops delivery to the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients whose queue accepted the frame
    pub delivered: Vec<ConnectionId>,
    /// Recipients whose queue was full or closed
    pub failed: Vec<(ConnectionId, DeliveryError)>,
}

impl DeliveryReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to enqueue `frame` for `conn` and record the result
    pub fn deliver(&mut self, conn: ConnectionId, outbound: &Outbound, frame: &str) {
        match outbound.try_deliver(frame) {
            Ok(()) => self.delivered.push(conn),
            Err(err) => {
                match err {
                    DeliveryError::QueueFull => {
                        warn!("Dropping frame for {}: {}", conn, err)
                    }
                    DeliveryError::Closed => {
                        debug!("Skipping closed connection {}", conn)
                    }
                }
                self.failed.push((conn, err));
            }
        }
    }

    /// Whether `conn` received the frame
    #[allow(dead_code)]
    pub fn reached(&self, conn: ConnectionId) -> bool {
        self.delivered.contains(&conn)
    }

    /// Whether every recipient received the frame
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_records_each_recipient() {
        let ok = ConnectionId::new();
        let full = ConnectionId::new();
        let closed = ConnectionId::new();

        let (ok_tx, _ok_rx) = Outbound::channel(4);
        let (full_tx, _full_rx) = Outbound::channel(1);
        full_tx.try_deliver("backlog").unwrap();
        let (closed_tx, closed_rx) = Outbound::channel(4);
        drop(closed_rx);

        let mut report = DeliveryReport::new();
        report.deliver(full, &full_tx, "frame");
        report.deliver(closed, &closed_tx, "frame");
        report.deliver(ok, &ok_tx, "frame");

        assert!(report.reached(ok));
        assert!(!report.reached(full));
        assert!(!report.is_complete());
        assert_eq!(
            report.failed,
            vec![
                (full, DeliveryError::QueueFull),
                (closed, DeliveryError::Closed)
            ]
        );
    }
}
