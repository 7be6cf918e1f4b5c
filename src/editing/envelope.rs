//! Units of work flowing through the edit pipeline

use crate::protocol::{ClientRequest, PictureId, UserId};
use crate::rooms::{Connection, ConnectionId, SessionContext};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// The client sent EXIT_EDIT
    Requested,
    /// Synthesized when the connection closed
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    EnterEdit,
    /// Raw action string, resolved by the coordinator
    EditAction(String),
    ExitEdit(ExitCause),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub context: Arc<SessionContext>,
    /// Connection that produced the event; excluded from action relays
    pub source: ConnectionId,
}

impl Envelope {
    pub fn from_request(request: ClientRequest, conn: &Connection) -> Self {
        let kind = match request {
            ClientRequest::EnterEdit => EnvelopeKind::EnterEdit,
            ClientRequest::EditAction(action) => EnvelopeKind::EditAction(action),
            ClientRequest::ExitEdit => EnvelopeKind::ExitEdit(ExitCause::Requested),
        };
        Self::new(kind, conn)
    }

    pub fn disconnected(conn: &Connection) -> Self {
        Self::new(EnvelopeKind::ExitEdit(ExitCause::Disconnected), conn)
    }

    fn new(kind: EnvelopeKind, conn: &Connection) -> Self {
        Self {
            kind,
            context: conn.context.clone(),
            source: conn.id,
        }
    }

    pub fn picture_id(&self) -> PictureId {
        self.context.picture_id
    }

    pub fn user_id(&self) -> UserId {
        self.context.user_id
    }
}
