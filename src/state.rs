//! Application state

use crate::config::Config;
use crate::editing::{EditLockCoordinator, Envelope};
use crate::handlers::AdmissionGate;
use crate::pipeline::{Pipeline, Publisher};
use crate::rooms::RoomRegistry;
use std::sync::Arc;

/// Process-wide state, created once at startup
pub struct AppState {
    pub config: Arc<Config>,
    /// Rooms keyed by picture
    pub rooms: Arc<RoomRegistry>,
    /// Single ordered path to the edit lock coordinator
    pub pipeline: Pipeline<Envelope>,
    pub gate: AdmissionGate,
}

impl AppState {
    /// Builds the registry and starts the pipeline worker. Needs a tokio runtime.
    pub fn new(config: Config, gate: AdmissionGate) -> Self {
        let rooms = Arc::new(RoomRegistry::new());
        let pipeline = Pipeline::spawn(
            config.pipeline.capacity,
            config.pipeline.backpressure(),
            EditLockCoordinator::new(rooms.clone()),
        );

        Self {
            config: Arc::new(config),
            rooms,
            pipeline,
            gate,
        }
    }

    pub fn publisher(&self) -> Publisher<Envelope> {
        self.pipeline.publisher()
    }
}
