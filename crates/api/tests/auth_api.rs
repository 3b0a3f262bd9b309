//! HTTP-level tests for login, token handling and tenant resolution.

mod common;

use axum::http::StatusCode;
use campus_core::roles::Role;
use campus_core::store::IdentityStore;
use common::{add_membership, body_json, create_tenant, get, get_in_tenant, post_json, TestApp, PASSWORD};

fn login_body(t: &TestApp, username: &str, password: &str) -> serde_json::Value {
    serde_json::json!({
        "username": username,
        "password": password,
        "tenant_id": t.tenant.id,
    })
}

#[tokio::test]
async fn login_returns_token_with_membership_role() {
    let t = TestApp::new().await;
    let response = post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "advisor", PASSWORD)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["access_token"].is_string());
    assert_eq!(json["expires_in"], 15 * 60);
    assert_eq!(json["user"]["username"], "advisor");
    assert_eq!(json["user"]["role"], "advisor");
    assert_eq!(json["user"]["tenant_id"], t.tenant.id.to_string());
}

#[tokio::test]
async fn issued_token_authenticates_me() {
    let t = TestApp::new().await;
    let login = body_json(post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "student", PASSWORD)).await).await;
    let token = login["access_token"].as_str().unwrap();

    let response = common::send(
        t.app.clone(),
        axum::http::Method::GET,
        "/api/v1/users/me",
        Some(token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user"]["username"], "student");
    assert_eq!(json["data"]["tenant"]["slug"], "north");
    assert_eq!(json["data"]["role"], "student");
    assert!(json["data"]["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let t = TestApp::new().await;
    let wrong = post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "student", "nope")).await;
    let unknown = post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "ghost", PASSWORD)).await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await["error"], body_json(unknown).await["error"]);
}

#[tokio::test]
async fn login_into_foreign_tenant_is_forbidden() {
    let t = TestApp::new().await;
    let south = create_tenant(&t.store, "south").await;
    let body = serde_json::json!({
        "username": "student",
        "password": PASSWORD,
        "tenant_id": south.id,
    });
    let response = post_json(t.app.clone(), "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn blank_username_is_rejected() {
    let t = TestApp::new().await;
    let response = post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthorized() {
    let t = TestApp::new().await;
    let missing = get(t.app.clone(), "/api/v1/users/me").await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbage = common::send(
        t.app.clone(),
        axum::http::Method::GET,
        "/api/v1/users/me",
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(garbage).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn tenant_header_switches_tenant_when_member() {
    let t = TestApp::new().await;
    let south = create_tenant(&t.store, "south").await;
    let token = t.token(&t.student);

    let denied = get_in_tenant(t.app.clone(), "/api/v1/users/me", &token, &south.id.to_string()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    add_membership(&t.store, &south, &t.student, Role::Instructor).await;
    let allowed = get_in_tenant(t.app.clone(), "/api/v1/users/me", &token, &south.id.to_string()).await;
    assert_eq!(allowed.status(), StatusCode::OK);
    let json = body_json(allowed).await;
    assert_eq!(json["data"]["tenant"]["slug"], "south");
    assert_eq!(json["data"]["role"], "instructor");
}

#[tokio::test]
async fn malformed_tenant_header_is_bad_request() {
    let t = TestApp::new().await;
    let response = get_in_tenant(t.app.clone(), "/api/v1/users/me", &t.token(&t.student), "north").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivated_tenant_refuses_requests() {
    let t = TestApp::new().await;
    assert!(t.store.deactivate_tenant(t.tenant.id).await.unwrap());
    assert!(!t.store.deactivate_tenant(t.tenant.id).await.unwrap());

    let response = t.get("/api/v1/users/me", &t.student).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json(t.app.clone(), "/api/v1/auth/login", login_body(&t, "student", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The tenant row survives the soft delete.
    let tenant = t.store.tenant(t.tenant.id).await.unwrap().unwrap();
    assert!(!tenant.active);
}
