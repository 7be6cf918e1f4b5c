//! Picture room registry
//!
//! Join/leave run on the connection tasks and are not ordered against the
//! edit pipeline. Their INFO broadcasts are best-effort; nothing about the
//! edit lock depends on them.

use super::broadcast::{broadcast, Delivery};
use super::connection::{Connection, ConnectionId};
use crate::protocol::{OutboundMessage, PictureId};
use dashmap::DashMap;
use std::sync::Arc;

/// Live connections attached to one picture
#[derive(Debug, Default)]
pub struct Room {
    pub(super) connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl Room {
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }
}

/// Rooms keyed by picture; a room exists only while it has connections
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<PictureId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to its picture's room and announces it to everyone there
    pub fn join(&self, conn: Arc<Connection>) -> Delivery {
        let picture_id = conn.picture_id();

        // Insert while holding the entry so a concurrent leave cannot drop the room in between
        {
            let room = self.rooms.entry(picture_id).or_insert_with(|| {
                tracing::info!(picture_id = %picture_id, "Room created");
                Room::default()
            });
            room.connections.insert(conn.id, conn.clone());
            tracing::info!(
                picture_id = %picture_id,
                user_id = %conn.user_id(),
                connection_id = %conn.id,
                members = room.len(),
                "User joined room"
            );
        }

        self.broadcast(picture_id, &OutboundMessage::joined(&conn.context.user), None)
    }

    /// Removes the connection and tells the remaining members.
    /// Returns `None` when the connection was not a member.
    pub fn leave(&self, conn: &Connection) -> Option<Delivery> {
        let picture_id = conn.picture_id();

        let (removed, emptied) = match self.rooms.get(&picture_id) {
            Some(room) => {
                let removed = room.connections.remove(&conn.id).is_some();
                (removed, room.is_empty())
            }
            None => (false, false),
        };

        if emptied
            && self
                .rooms
                .remove_if(&picture_id, |_, room| room.is_empty())
                .is_some()
        {
            tracing::info!(picture_id = %picture_id, "Room deleted");
        }

        if !removed {
            return None;
        }

        tracing::info!(
            picture_id = %picture_id,
            user_id = %conn.user_id(),
            connection_id = %conn.id,
            "User left room"
        );

        Some(self.broadcast(picture_id, &OutboundMessage::left(&conn.context.user), None))
    }

    /// Sends a message to every open connection of a room, optionally skipping one
    pub fn broadcast(
        &self,
        picture_id: PictureId,
        message: &OutboundMessage,
        exclude: Option<ConnectionId>,
    ) -> Delivery {
        match self.rooms.get(&picture_id) {
            Some(room) => broadcast(&room, message, exclude),
            None => Delivery::default(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|room| room.len()).sum()
    }

    #[cfg(test)]
    pub fn members(&self, picture_id: PictureId) -> usize {
        self.rooms.get(&picture_id).map(|room| room.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_member(&self, picture_id: PictureId, id: &ConnectionId) -> bool {
        self.rooms
            .get(&picture_id)
            .map(|room| room.contains(id))
            .unwrap_or(false)
    }
}
