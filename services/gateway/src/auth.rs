// X-API-Key enforcement for the control surface. The websocket route
// authenticates in-band instead, and health stays reachable without
// credentials.
use crate::api::error::api_unauthorized;
use crate::app::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.validator.is_enabled() {
        return next.run(request).await;
    }
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() {
        return api_unauthorized("MISSING_API_KEY", "Missing X-API-Key header").into_response();
    }
    if !state.validator.validate(presented) {
        return api_unauthorized("INVALID_API_KEY", "Invalid or expired API key").into_response();
    }
    next.run(request).await
}
