//! Per-picture edit lock
//!
//! Only the pipeline worker calls into the coordinator, so the lock table is
//! a plain map with no synchronization of its own.

use super::envelope::{Envelope, EnvelopeKind, ExitCause};
use crate::pipeline::EventHandler;
use crate::protocol::{EditAction, OutboundMessage, PictureId, UserId};
use crate::rooms::{Delivery, RoomRegistry};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyLocked(UserId),
    NotOwner,
    UnknownAction(String),
}

/// Result of applying one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Locked(Delivery),
    Relayed(Delivery),
    Released(Delivery),
    Ignored(IgnoreReason),
}

pub struct EditLockCoordinator {
    /// Owner per locked picture
    locks: HashMap<PictureId, UserId>,
    registry: Arc<RoomRegistry>,
}

impl EditLockCoordinator {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            locks: HashMap::new(),
            registry,
        }
    }

    #[cfg(test)]
    pub fn lock_state(&self, picture_id: PictureId) -> LockState {
        match self.locks.get(&picture_id) {
            Some(owner) => LockState::Locked(*owner),
            None => LockState::Unlocked,
        }
    }

    pub fn locked_rooms(&self) -> usize {
        self.locks.len()
    }

    pub fn apply(&mut self, envelope: Envelope) -> Outcome {
        match &envelope.kind {
            EnvelopeKind::EnterEdit => self.enter(&envelope),
            EnvelopeKind::EditAction(action) => self.relay(&envelope, action),
            EnvelopeKind::ExitEdit(cause) => self.exit(&envelope, *cause),
        }
    }

    fn enter(&mut self, envelope: &Envelope) -> Outcome {
        let picture_id = envelope.picture_id();
        if let Some(owner) = self.locks.get(&picture_id) {
            return Outcome::Ignored(IgnoreReason::AlreadyLocked(*owner));
        }

        self.locks.insert(picture_id, envelope.user_id());
        tracing::info!(
            picture_id = %picture_id,
            user_id = %envelope.user_id(),
            "Edit lock acquired"
        );

        let delivery = self.registry.broadcast(
            picture_id,
            &OutboundMessage::enter_edit(&envelope.context.user),
            None,
        );
        Outcome::Locked(delivery)
    }

    fn relay(&mut self, envelope: &Envelope, raw_action: &str) -> Outcome {
        let action: EditAction = match raw_action.parse() {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(
                    picture_id = %envelope.picture_id(),
                    user_id = %envelope.user_id(),
                    error = %e,
                    "Dropping edit action"
                );
                return Outcome::Ignored(IgnoreReason::UnknownAction(raw_action.to_string()));
            }
        };

        if !self.is_owner(envelope.picture_id(), envelope.user_id()) {
            return Outcome::Ignored(IgnoreReason::NotOwner);
        }

        let delivery = self.registry.broadcast(
            envelope.picture_id(),
            &OutboundMessage::edit_action(&envelope.context.user, action),
            Some(envelope.source),
        );
        Outcome::Relayed(delivery)
    }

    fn exit(&mut self, envelope: &Envelope, cause: ExitCause) -> Outcome {
        let picture_id = envelope.picture_id();
        // Any socket of the owning user releases, whether by request or by closing
        if !self.is_owner(picture_id, envelope.user_id()) {
            return Outcome::Ignored(IgnoreReason::NotOwner);
        }

        self.locks.remove(&picture_id);
        tracing::info!(
            picture_id = %picture_id,
            user_id = %envelope.user_id(),
            cause = ?cause,
            "Edit lock released"
        );

        let delivery = self.registry.broadcast(
            picture_id,
            &OutboundMessage::exit_edit(&envelope.context.user),
            None,
        );
        Outcome::Released(delivery)
    }

    fn is_owner(&self, picture_id: PictureId, user_id: UserId) -> bool {
        self.locks
            .get(&picture_id)
            .map(|owner| *owner == user_id)
            .unwrap_or(false)
    }
}

impl EventHandler<Envelope> for EditLockCoordinator {
    fn handle(&mut self, seq: u64, envelope: Envelope) {
        let picture_id = envelope.picture_id();
        let user_id = envelope.user_id();
        let outcome = self.apply(envelope);
        tracing::debug!(
            seq,
            picture_id = %picture_id,
            user_id = %user_id,
            outcome = ?outcome,
            locked_rooms = self.locked_rooms(),
            "Edit event applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Backpressure, Pipeline};
    use crate::protocol::ClientRequest;
    use crate::rooms::connection::test_support::{connection, drain};
    use crate::rooms::Connection;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<RoomRegistry>,
        coordinator: EditLockCoordinator,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(RoomRegistry::new());
            Self {
                coordinator: EditLockCoordinator::new(registry.clone()),
                registry,
            }
        }

        fn join(&self, user: i64, name: &str) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
            let (conn, mut rx) = connection(42, user, name);
            self.registry.join(conn.clone());
            drain(&mut rx);
            (conn, rx)
        }

        fn send(&mut self, conn: &Connection, request: ClientRequest) -> Outcome {
            self.coordinator.apply(Envelope::from_request(request, conn))
        }
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames.iter().filter_map(|f| f["type"].as_str()).collect()
    }

    #[test]
    fn enter_locks_and_notifies_everyone() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (_b, mut rx_b) = fx.join(2, "bob");
        drain(&mut rx_a);

        let outcome = fx.send(&a, ClientRequest::EnterEdit);

        assert!(matches!(outcome, Outcome::Locked(d) if d.delivered == 2));
        assert_eq!(
            fx.coordinator.lock_state(PictureId(42)),
            LockState::Locked(UserId(1))
        );
        assert_eq!(types(&drain(&mut rx_a)), vec!["ENTER_EDIT"]);
        let frames = drain(&mut rx_b);
        assert_eq!(frames[0]["message"], "alice started editing the picture");
    }

    #[test]
    fn enter_while_locked_is_silent() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (b, mut rx_b) = fx.join(2, "bob");
        fx.send(&a, ClientRequest::EnterEdit);
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = fx.send(&b, ClientRequest::EnterEdit);

        assert_eq!(outcome, Outcome::Ignored(IgnoreReason::AlreadyLocked(UserId(1))));
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn owner_action_skips_the_sender() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (_b, mut rx_b) = fx.join(2, "bob");
        fx.send(&a, ClientRequest::EnterEdit);
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = fx.send(&a, ClientRequest::EditAction("undo".to_string()));

        assert!(matches!(outcome, Outcome::Relayed(d) if d.delivered == 1));
        assert!(drain(&mut rx_a).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(frames[0]["type"], "EDIT_ACTION");
        assert_eq!(frames[0]["editAction"], "UNDO");
    }

    #[test]
    fn non_owner_action_is_dropped() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (b, mut rx_b) = fx.join(2, "bob");

        assert_eq!(
            fx.send(&b, ClientRequest::EditAction("ZOOM_IN".to_string())),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        fx.send(&a, ClientRequest::EnterEdit);
        drain(&mut rx_a);
        drain(&mut rx_b);
        assert_eq!(
            fx.send(&b, ClientRequest::EditAction("ZOOM_IN".to_string())),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn unknown_action_is_a_no_op() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (_b, mut rx_b) = fx.join(2, "bob");
        fx.send(&a, ClientRequest::EnterEdit);
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert_eq!(
            fx.send(&a, ClientRequest::EditAction("SHRED".to_string())),
            Outcome::Ignored(IgnoreReason::UnknownAction("SHRED".to_string()))
        );
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn exit_is_owner_only_and_idempotent() {
        let mut fx = Fixture::new();
        let (a, mut rx_a) = fx.join(1, "alice");
        let (b, mut rx_b) = fx.join(2, "bob");
        fx.send(&a, ClientRequest::EnterEdit);
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert_eq!(
            fx.send(&b, ClientRequest::ExitEdit),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(matches!(fx.send(&a, ClientRequest::ExitEdit), Outcome::Released(_)));
        assert_eq!(types(&drain(&mut rx_b)), vec!["EXIT_EDIT"]);
        assert_eq!(fx.coordinator.lock_state(PictureId(42)), LockState::Unlocked);

        assert_eq!(
            fx.send(&a, ClientRequest::ExitEdit),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(fx.coordinator.locked_rooms(), 0);
    }

    #[test]
    fn closing_any_socket_of_the_owner_releases() {
        let mut fx = Fixture::new();
        let (tab1, _rx1) = fx.join(1, "alice");
        let (tab2, _rx2) = fx.join(1, "alice");
        let (b, mut rx_b) = fx.join(2, "bob");
        fx.send(&tab1, ClientRequest::EnterEdit);
        drain(&mut rx_b);

        assert_eq!(
            fx.coordinator.apply(Envelope::disconnected(&b)),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(matches!(
            fx.coordinator.apply(Envelope::disconnected(&tab2)),
            Outcome::Released(_)
        ));
        assert_eq!(fx.coordinator.lock_state(PictureId(42)), LockState::Unlocked);
        assert_eq!(types(&drain(&mut rx_b)), vec!["EXIT_EDIT"]);

        // The lock is gone, so the first tab closing afterwards is a no-op
        assert_eq!(
            fx.coordinator.apply(Envelope::disconnected(&tab1)),
            Outcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enter_grants_exactly_one_lock() {
        let registry = Arc::new(RoomRegistry::new());
        let mut members = Vec::new();
        for user in 1..=16 {
            let (conn, mut rx) = connection(42, user, &format!("user{user}"));
            registry.join(conn.clone());
            drain(&mut rx);
            members.push((conn, rx));
        }
        for (_, rx) in members.iter_mut() {
            drain(rx);
        }

        let pipeline = Pipeline::spawn(
            4,
            Backpressure::Block,
            EditLockCoordinator::new(registry.clone()),
        );
        let mut tasks = Vec::new();
        for (conn, _) in &members {
            let publisher = pipeline.publisher();
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                publisher
                    .submit(Envelope::from_request(ClientRequest::EnterEdit, &conn))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        pipeline.shutdown().await;

        let mut owners = Vec::new();
        for (_, rx) in members.iter_mut() {
            let frames = drain(rx);
            assert_eq!(types(&frames), vec!["ENTER_EDIT"]);
            owners.push(frames[0]["user"]["id"].clone());
        }
        owners.dedup();
        assert_eq!(owners.len(), 1);
    }
}
