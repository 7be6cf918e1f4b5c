//! Per-socket connection state

use crate::protocol::{PictureId, UserId, UserSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Identity fixed at admission; never changes for the life of the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    pub picture_id: PictureId,
    pub user: UserSummary,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    Full,
    #[error("socket writer gone")]
    Closed,
}

/// One attached socket
///
/// Outbound frames go through a bounded queue drained by the socket's writer
/// task, so delivering never waits on the network.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub context: Arc<SessionContext>,
    outbound: mpsc::Sender<Arc<str>>,
    open: AtomicBool,
}

impl Connection {
    pub fn new(context: Arc<SessionContext>, outbound: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            outbound,
            open: AtomicBool::new(true),
        }
    }

    pub fn picture_id(&self) -> PictureId {
        self.context.picture_id
    }

    pub fn user_id(&self) -> UserId {
        self.context.user_id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Marks the connection closed. Returns true only for the first caller.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Queues a serialized frame without waiting
    pub fn deliver(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let (conn, _rx) = connection(1, 1, "alice");
        assert!(conn.is_open());
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_open());
    }

    #[test]
    fn deliver_reports_full_and_closed_queues() {
        let (tx, rx) = mpsc::channel(1);
        let (conn, _) = connection(1, 1, "alice");
        let conn = Connection::new(conn.context.clone(), tx);

        assert_eq!(conn.deliver(Arc::from("a")), Ok(()));
        assert_eq!(conn.deliver(Arc::from("b")), Err(DeliveryError::Full));
        drop(rx);
        assert_eq!(conn.deliver(Arc::from("c")), Err(DeliveryError::Closed));
    }
}
