//! Wire protocol shared by the socket handlers and the edit pipeline

pub mod ids;
pub mod messages;

pub use ids::*;
pub use messages::*;
