//! WebSocket connection runtime: upgrade handshake, auth gate, and the
//! per-connection read/write task pair.
mod session;

use crate::app::AppState;
use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

pub(crate) async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    // Refuse new connections once shutdown has begun.
    if state.engine.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "server is shutting down"})),
        )
            .into_response();
    }
    let client_id = params
        .get("client_id")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(generate_client_id);
    ws.on_upgrade(move |socket| session::run(socket, state, client_id))
}

// Short random id for connections that do not name themselves.
fn generate_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("client-{}", &id[..8])
}
