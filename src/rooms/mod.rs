//! Room membership and fan-out

pub mod broadcast;
pub mod connection;
pub mod registry;

pub use broadcast::Delivery;
pub use connection::{Connection, ConnectionId, SessionContext};
pub use registry::RoomRegistry;
