//! Control API error types and helpers.
//!
//! Centralizes HTTP error response construction so every endpoint fails
//! with the same `{"error":{"code","message"}}` shape.
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        },
    }
}

pub fn api_bad_request(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND", message)
}

pub fn api_conflict(message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, "TOPIC_EXISTS", message)
}

pub fn api_unauthorized(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, code, message)
}

pub fn api_internal(message: &str, err: &relay_engine::EngineError) -> ApiError {
    tracing::error!(error = ?err, "engine operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
}
