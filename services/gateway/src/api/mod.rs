//! Control-surface handlers: topic lifecycle and introspection over the
//! engine, presented as short-lived request/response operations.
pub mod error;
pub mod system;
pub mod topics;
pub mod types;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "relay-gateway",
        version = "v1",
        description = "In-memory pub/sub gateway control API"
    ),
    paths(
        system::health,
        topics::create_topic,
        topics::delete_topic,
        topics::list_topics,
        topics::get_stats
    ),
    components(schemas(
        error::ErrorBody,
        error::ErrorDetail,
        types::CreateTopicRequest,
        types::CreateTopicResponse,
        types::DeleteTopicResponse,
        types::HealthResponse,
        types::ListTopicsResponse,
        types::ServiceInfo,
        types::StatsResponse,
        types::TopicEntry,
        types::TopicStatsEntry
    )),
    tags(
        (name = "system", description = "Health and service metadata"),
        (name = "topics", description = "Topic lifecycle and statistics")
    )
)]
pub struct ApiDoc;
