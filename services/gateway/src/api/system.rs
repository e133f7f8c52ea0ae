//! Service metadata and health handlers.
use crate::api::ApiDoc;
use crate::api::types::{HealthResponse, ServiceInfo};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use std::collections::HashMap;
use utoipa::OpenApi;

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Engine health", body = HealthResponse)
    )
)]
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.engine.health().await.into())
}

// Root index: a small map of where everything lives.
pub(crate) async fn index() -> Json<ServiceInfo> {
    let endpoints = HashMap::from([
        ("websocket".to_string(), "/ws".to_string()),
        ("topics".to_string(), "/topics".to_string()),
        ("health".to_string(), "/health".to_string()),
        ("stats".to_string(), "/stats".to_string()),
    ]);
    Json(ServiceInfo {
        service: "relay-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

pub(crate) async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
