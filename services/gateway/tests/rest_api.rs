mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{read_json, test_config};
use gateway::app::{AppState, build_router};
use tower::ServiceExt;

fn app() -> Router {
    build_router(AppState::new(test_config()))
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn topic_lifecycle_round_trip() {
    let app = app();

    let create = json_request("POST", "/topics", serde_json::json!({"name": "orders"}));
    let response = app.clone().oneshot(create).await.expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "created");
    assert_eq!(payload["topic"], "orders");

    let duplicate = json_request("POST", "/topics", serde_json::json!({"name": "orders"}));
    let response = app.clone().oneshot(duplicate).await.expect("duplicate");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json(response).await;
    assert_eq!(payload["error"]["code"], "TOPIC_EXISTS");

    let response = app.clone().oneshot(get_request("/topics")).await.expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let topics = payload["topics"].as_array().expect("topics");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0]["name"], "orders");
    assert_eq!(topics[0]["subscribers"], 0);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/topics/orders")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(delete).await.expect("delete");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "deleted");
    assert_eq!(payload["topic"], "orders");

    let delete_again = Request::builder()
        .method("DELETE")
        .uri("/topics/orders")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(delete_again).await.expect("missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json(response).await;
    assert_eq!(payload["error"]["code"], "TOPIC_NOT_FOUND");

    let response = app.clone().oneshot(get_request("/topics")).await.expect("list");
    let payload = read_json(response).await;
    assert!(payload["topics"].as_array().expect("topics").is_empty());
}

#[tokio::test]
async fn create_topic_requires_a_name() {
    let app = app();
    let create = json_request("POST", "/topics", serde_json::json!({}));
    let response = app.oneshot(create).await.expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn health_reports_engine_counts() {
    let app = app();
    let response = app.oneshot(get_request("/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert!(payload["uptime_sec"].is_u64());
    assert_eq!(payload["topics"], 0);
    assert_eq!(payload["subscribers"], 0);
}

#[tokio::test]
async fn stats_cover_every_topic() {
    let app = app();
    for name in ["orders", "invoices"] {
        let create = json_request("POST", "/topics", serde_json::json!({"name": name}));
        let response = app.clone().oneshot(create).await.expect("create");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app.oneshot(get_request("/stats")).await.expect("stats");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["topics"]["orders"]["messages"], 0);
    assert_eq!(payload["topics"]["orders"]["subscribers"], 0);
    assert_eq!(payload["topics"]["invoices"]["messages"], 0);
}

#[tokio::test]
async fn index_lists_endpoints() {
    let app = app();
    let response = app.oneshot(get_request("/")).await.expect("index");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["service"], "relay-gateway");
    assert_eq!(payload["endpoints"]["websocket"], "/ws");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = app();
    let response = app.oneshot(get_request("/openapi.json")).await.expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert!(payload["openapi"].is_string());
    assert!(payload["paths"]["/topics"].is_object());
}
