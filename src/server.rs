//! HTTP routes

use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const WS_PATH: &str = "/ws/picture/edit";

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route(WS_PATH, get(handlers::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn index_handler() -> Html<String> {
    Html(format!(
        "<h1>Picture Edit Server</h1><p>WebSocket endpoint: {WS_PATH}?pictureId=&lt;id&gt;</p>"
    ))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let publisher = state.publisher();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Json(serde_json::json!({
        "status": "ok",
        "server": env!("CARGO_PKG_NAME"),
        "timestamp": timestamp,
        "rooms": state.rooms.room_count(),
        "connections": state.rooms.connection_count(),
        "pipeline": {
            "capacity": publisher.capacity(),
            "queued": publisher.queued(),
        },
    }))
}
