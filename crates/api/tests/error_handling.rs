//! Cross-cutting error behavior: rate limiting and request body rejections.

mod common;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{Method, Request, StatusCode};
use campus_api::config::RateLimitConfig;
use common::{body_json, test_config, TestApp};
use serde_json::json;
use tower::ServiceExt;

async fn limited_app() -> TestApp {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        capacity: 1.0,
        refill_per_sec: 0.001,
    };
    TestApp::with_config(config).await
}

#[tokio::test]
async fn writes_beyond_the_bucket_are_rejected() {
    let t = limited_app().await;
    let room = |name: &str| json!({ "name": name, "capacity": 10 });

    let first = t.post("/api/v1/rooms", &t.admin, room("R1")).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = t.post("/api/v1/rooms", &t.admin, room("R2")).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second
        .headers()
        .get(RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let body = body_json(second).await;
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["retry_after_secs"], retry_after);

    // Another actor has their own bucket.
    let other = t.post("/api/v1/cohorts", &t.advisor, json!({ "name": "2025" })).await;
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn reads_are_not_limited() {
    let t = limited_app().await;
    for _ in 0..5 {
        assert_eq!(t.get("/api/v1/rooms", &t.admin).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn malformed_json_is_a_client_error() {
    let t = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/rooms")
        .header(AUTHORIZATION, format!("Bearer {}", t.token(&t.admin)))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_fields_are_a_client_error() {
    let t = TestApp::new().await;
    let response = t.post("/api/v1/rooms", &t.admin, json!({ "capacity": 10 })).await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn error_bodies_carry_a_code() {
    let t = TestApp::new().await;
    let response = t.get(&format!("/api/v1/programs/{}", uuid::Uuid::nil()), &t.admin).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["error"].as_str().is_some());
}
