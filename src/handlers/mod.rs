//! HTTP and WebSocket handlers

pub mod admission;
pub mod connection;

pub use admission::{AdmissionError, AdmissionGate};
pub use connection::*;
