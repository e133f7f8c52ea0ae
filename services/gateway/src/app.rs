//! Router wiring and the shared application state injected into handlers.
use crate::api;
use crate::auth;
use crate::config::GatewayConfig;
use crate::ws;
use axum::Router;
use axum::routing::get;
use relay_auth::KeyValidator;
use relay_engine::Engine;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub validator: Arc<KeyValidator>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let engine = Arc::new(Engine::new(config.ring_buffer_size));
        let validator = Arc::new(KeyValidator::new(&config.api_keys, config.auth_enabled));
        Self {
            engine,
            validator,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Control requests get an end-to-end deadline covering the read and
    // write budgets. The websocket route is mounted after the timeout layer
    // because the connection is long-lived.
    let request_deadline = state.config.read_timeout + state.config.write_timeout;

    let protected = Router::new()
        .route(
            "/topics",
            get(api::topics::list_topics).post(api::topics::create_topic),
        )
        .route(
            "/topics/:name",
            axum::routing::delete(api::topics::delete_topic),
        )
        .route("/stats", get(api::topics::get_stats))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/", get(api::system::index))
        .route("/health", get(api::system::health))
        .route("/openapi.json", get(api::system::openapi))
        .merge(protected)
        .layer(TimeoutLayer::new(request_deadline))
        .route("/ws", get(ws::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
