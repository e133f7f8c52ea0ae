//! Topic lifecycle and statistics handlers.
use crate::api::error::{
    ApiError, ErrorBody, api_bad_request, api_conflict, api_internal, api_not_found,
};
use crate::api::types::{
    CreateTopicRequest, CreateTopicResponse, DeleteTopicResponse, ListTopicsResponse,
    StatsResponse, TopicEntry,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use relay_engine::EngineError;

#[utoipa::path(
    post,
    path = "/topics",
    tag = "topics",
    request_body = CreateTopicRequest,
    responses(
        (status = 201, description = "Topic created", body = CreateTopicResponse),
        (status = 400, description = "Missing topic name", body = ErrorBody),
        (status = 409, description = "Topic already exists", body = ErrorBody)
    )
)]
pub(crate) async fn create_topic(
    State(state): State<AppState>,
    Json(body): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.is_empty() {
        return Err(api_bad_request("topic name cannot be empty"));
    }
    match state.engine.create_topic(&body.name).await {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(CreateTopicResponse {
                status: "created".to_string(),
                topic: body.name,
            }),
        )),
        Err(EngineError::TopicExists(_)) => Err(api_conflict("topic already exists")),
        Err(err) => Err(api_internal("failed to create topic", &err)),
    }
}

#[utoipa::path(
    delete,
    path = "/topics/{name}",
    tag = "topics",
    params(
        ("name" = String, Path, description = "Topic name")
    ),
    responses(
        (status = 200, description = "Topic deleted", body = DeleteTopicResponse),
        (status = 404, description = "Topic not found", body = ErrorBody)
    )
)]
pub(crate) async fn delete_topic(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteTopicResponse>, ApiError> {
    match state.engine.delete_topic(&name).await {
        Ok(()) => Ok(Json(DeleteTopicResponse {
            status: "deleted".to_string(),
            topic: name,
        })),
        Err(EngineError::TopicNotFound(_)) => Err(api_not_found("topic not found")),
        Err(err) => Err(api_internal("failed to delete topic", &err)),
    }
}

#[utoipa::path(
    get,
    path = "/topics",
    tag = "topics",
    responses(
        (status = 200, description = "List topics", body = ListTopicsResponse)
    )
)]
pub(crate) async fn list_topics(State(state): State<AppState>) -> Json<ListTopicsResponse> {
    let topics = state
        .engine
        .list_topics()
        .await
        .into_iter()
        .map(TopicEntry::from)
        .collect();
    Json(ListTopicsResponse { topics })
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = "topics",
    responses(
        (status = 200, description = "Per-topic statistics", body = StatsResponse)
    )
)]
pub(crate) async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let topics = state
        .engine
        .stats()
        .await
        .into_iter()
        .map(|(name, stats)| (name, stats.into()))
        .collect();
    Json(StatsResponse { topics })
}
