//! Picture edit socket lifecycle

use super::admission::AdmissionParams;
use crate::editing::Envelope;
use crate::pipeline::Publisher;
use crate::protocol::ClientRequest;
use crate::rooms::{Connection, SessionContext};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Admits the handshake, then upgrades. Rejections never create a connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<AdmissionParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, super::AdmissionError> {
    let context = state.gate.admit(&params, &headers).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, context)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, context: SessionContext) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(state.config.outbound_buffer);

    let conn = Arc::new(Connection::new(Arc::new(context), tx));
    let publisher = state.publisher();

    // Writer task
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    handle_connection(&state, conn.clone());

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => handle_text(&publisher, &conn, &text).await,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(connection_id = %conn.id, error = %e, "Socket read failed");
                break;
            }
            _ => {}
        }
    }

    handle_disconnect(&state, &publisher, &conn).await;
    send_task.abort();
}

/// Registers the connection in its picture's room
pub fn handle_connection(state: &AppState, conn: Arc<Connection>) {
    tracing::info!(
        connection_id = %conn.id,
        picture_id = %conn.picture_id(),
        user_id = %conn.user_id(),
        "New connection established"
    );
    state.rooms.join(conn);
}

async fn handle_text(publisher: &Publisher<Envelope>, conn: &Connection, text: &str) {
    let request = match ClientRequest::parse(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(connection_id = %conn.id, error = %e, "Dropping inbound frame");
            return;
        }
    };

    if let Err(e) = publisher.submit(Envelope::from_request(request, conn)).await {
        tracing::warn!(
            connection_id = %conn.id,
            picture_id = %conn.picture_id(),
            error = %e,
            "Edit event not accepted"
        );
    }
}

/// Tears a connection down exactly once, however many times it is called.
///
/// The lock release is published before the connection leaves the room, so
/// any event submitted after the departure is ordered behind the release. It
/// waits for a slot regardless of the backpressure policy; dropping it would
/// leave the picture locked by a user who is gone.
pub async fn handle_disconnect(state: &AppState, publisher: &Publisher<Envelope>, conn: &Connection) {
    if !conn.close() {
        return;
    }

    if let Err(e) = publisher.submit_blocking(Envelope::disconnected(conn)).await {
        tracing::error!(
            connection_id = %conn.id,
            picture_id = %conn.picture_id(),
            error = %e,
            "Failed to enqueue lock release"
        );
    }
    state.rooms.leave(conn);

    tracing::info!(connection_id = %conn.id, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::editing::EditLockCoordinator;
    use crate::handlers::admission::test_support::directory;
    use crate::handlers::AdmissionGate;
    use crate::pipeline::{Backpressure, EventHandler, Pipeline};
    use crate::protocol::PictureId;
    use crate::rooms::connection::test_support::{connection, drain};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn types(frames: &[serde_json::Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_releases_the_lock() {
        let state = AppState::new(Config::default(), AdmissionGate::from_directory(directory()));
        let publisher = state.publisher();
        let (a, mut rx_a) = connection(42, 1, "alice");
        let (b, mut rx_b) = connection(42, 2, "bob");
        handle_connection(&state, a.clone());
        handle_connection(&state, b.clone());

        handle_text(&publisher, &a, r#"{"type":"ENTER_EDIT"}"#).await;
        handle_text(&publisher, &a, "{oops").await;
        handle_disconnect(&state, &publisher, &a).await;
        handle_disconnect(&state, &publisher, &a).await;
        let report = state.pipeline.shutdown().await;

        assert_eq!(report.processed, 2);
        assert!(!state.rooms.is_member(PictureId(42), &a.id));
        let mut types = types(&drain(&mut rx_b));
        assert_eq!(types[..2], ["INFO", "ENTER_EDIT"]);
        // "left" is not ordered against the pipeline
        types[2..].sort();
        assert_eq!(types[2..], ["EXIT_EDIT", "INFO"]);
        assert_eq!(drain(&mut rx_a).len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_release_waits_out_a_full_pipeline() {
        let state = Arc::new(AppState::new(
            Config::default(),
            AdmissionGate::from_directory(directory()),
        ));
        let (a, _rx_a) = connection(42, 1, "alice");
        let (b, mut rx_b) = connection(42, 2, "bob");
        handle_connection(&state, a.clone());
        handle_connection(&state, b.clone());

        // Coordinator that stalls on its first event
        let started = Arc::new(Notify::new());
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let signal = started.clone();
        let mut coordinator = EditLockCoordinator::new(state.rooms.clone());
        let mut stalled = false;
        let pipeline = Pipeline::spawn(
            1,
            Backpressure::DropAfter(Duration::from_millis(20)),
            move |seq: u64, envelope: Envelope| {
                if !stalled {
                    stalled = true;
                    signal.notify_one();
                    let _ = release_rx.recv();
                }
                coordinator.handle(seq, envelope);
            },
        );
        let publisher = pipeline.publisher();

        handle_text(&publisher, &a, r#"{"type":"ENTER_EDIT"}"#).await;
        started.notified().await;
        handle_text(&publisher, &b, r#"{"type":"EDIT_ACTION","editAction":"UNDO"}"#).await;

        let leaving = {
            let (state, publisher, a) = (state.clone(), publisher.clone(), a.clone());
            tokio::spawn(async move { handle_disconnect(&state, &publisher, &a).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!leaving.is_finished());

        drop(release_tx);
        leaving.await.unwrap();
        let report = pipeline.shutdown().await;

        assert_eq!(report.processed, 3);
        let types = types(&drain(&mut rx_b));
        assert_eq!(types[..2], ["INFO", "ENTER_EDIT"]);
        assert!(types.contains(&"EXIT_EDIT".to_string()));
        assert_eq!(state.rooms.members(PictureId(42)), 1);
    }
}
