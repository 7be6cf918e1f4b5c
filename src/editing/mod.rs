//! Edit lock state machine fed by the event pipeline

pub mod coordinator;
pub mod envelope;

pub use coordinator::EditLockCoordinator;
pub use envelope::Envelope;
