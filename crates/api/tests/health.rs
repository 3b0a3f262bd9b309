//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, TestApp};

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let t = TestApp::new().await;
    let response = get(t.app.clone(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store_healthy"], true);
    assert!(json["store_latency_ms"].is_u64());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = TestApp::new().await;
    let response = get(t.app.clone(), "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let t = TestApp::new().await;
    let response = get(t.app.clone(), "/health").await;
    assert!(response.headers().contains_key("x-request-id"));
}
