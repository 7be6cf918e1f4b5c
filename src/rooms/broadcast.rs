//! Room fan-out

use super::connection::{ConnectionId, DeliveryError};
use super::registry::Room;
use crate::protocol::OutboundMessage;
use std::sync::Arc;

/// Per-broadcast delivery counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Serializes once, then queues the frame on every open connection except `exclude`.
/// A failing socket is logged and does not stop delivery to the others.
pub fn broadcast(room: &Room, message: &OutboundMessage, exclude: Option<ConnectionId>) -> Delivery {
    let mut delivery = Delivery::default();

    let frame: Arc<str> = match serde_json::to_string(message) {
        Ok(json) => json.into(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize outbound message");
            return delivery;
        }
    };

    for entry in room.connections.iter() {
        let conn = entry.value();
        if Some(conn.id) == exclude || !conn.is_open() {
            delivery.skipped += 1;
            continue;
        }
        match conn.deliver(frame.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(DeliveryError::Full) => {
                delivery.failed += 1;
                tracing::warn!(
                    connection_id = %conn.id,
                    user_id = %conn.user_id(),
                    "Outbound queue full, frame dropped"
                );
            }
            Err(DeliveryError::Closed) => {
                delivery.failed += 1;
                tracing::debug!(connection_id = %conn.id, "Socket writer already gone");
            }
        }
    }

    tracing::debug!(
        kind = ?message.kind,
        delivered = delivery.delivered,
        skipped = delivery.skipped,
        failed = delivery.failed,
        "Broadcast"
    );
    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PictureId;
    use crate::rooms::connection::test_support::{connection, drain, user};
    use crate::rooms::connection::Connection;
    use crate::rooms::RoomRegistry;
    use tokio::sync::mpsc;

    #[test]
    fn skips_excluded_and_closed_connections() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connection(5, 1, "alice");
        let (b, mut rx_b) = connection(5, 2, "bob");
        let (c, mut rx_c) = connection(5, 3, "carol");
        registry.join(a.clone());
        registry.join(b.clone());
        registry.join(c.clone());
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);
        c.close();

        let delivery = registry.broadcast(
            PictureId(5),
            &OutboundMessage::enter_edit(&user(1, "alice")),
            Some(a.id),
        );

        assert_eq!(delivery, Delivery { delivered: 1, skipped: 2, failed: 0 });
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn one_failing_socket_does_not_block_the_rest() {
        let registry = RoomRegistry::new();
        let (a, _) = connection(5, 1, "alice");
        let (tx, rx) = mpsc::channel(1);
        let dead = Arc::new(Connection::new(a.context.clone(), tx));
        drop(rx);
        let (b, mut rx_b) = connection(5, 2, "bob");
        registry.join(dead);
        registry.join(b);
        drain(&mut rx_b);

        let delivery = registry.broadcast(
            PictureId(5),
            &OutboundMessage::exit_edit(&user(1, "alice")),
            None,
        );

        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.failed, 1);
        assert_eq!(drain(&mut rx_b)[0]["type"], "EXIT_EDIT");
    }

    #[test]
    fn missing_room_delivers_nothing() {
        let registry = RoomRegistry::new();
        let delivery = registry.broadcast(
            PictureId(404),
            &OutboundMessage::joined(&user(1, "alice")),
            None,
        );
        assert_eq!(delivery, Delivery::default());
    }
}
