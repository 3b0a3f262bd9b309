//! HTTP-level tests for the program builder and publishing.

mod common;

use axum::http::StatusCode;
use campus_core::roles::Role;
use campus_core::store::IdentityStore;
use campus_core::tenancy::NewUser;
use campus_core::types::DbId;
use campus_events::bus::event_types;
use common::{add_membership, body_json, TestApp};
use serde_json::{json, Value};

fn info(node_id: &str, world: &str, prerequisites: &[&str]) -> Value {
    json!({
        "node_id": node_id,
        "type": "info",
        "title": {"en": node_id},
        "world_key": world,
        "prerequisites": prerequisites,
    })
}

fn form(node_id: &str, world: &str, prerequisites: &[&str]) -> Value {
    json!({
        "node_id": node_id,
        "type": "form",
        "title": {"en": node_id},
        "world_key": world,
        "prerequisites": prerequisites,
        "config": {
            "fields": [{"key": "topic", "type": "text", "label": {"en": "Topic"}, "required": true}]
        },
    })
}

async fn program(t: &TestApp) -> String {
    let response = t
        .post(
            "/api/v1/programs",
            &t.admin,
            json!({ "code": "PHD", "title": {"en": "Doctoral programme"} }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn build_publish_and_start_a_journey() {
    let t = TestApp::new().await;
    let pid = program(&t).await;
    let nodes = format!("/api/v1/programs/{pid}/builder/nodes");

    let intro = t.post(&nodes, &t.admin, info("intro", "onboarding", &[])).await;
    assert_eq!(intro.status(), StatusCode::CREATED);
    let proposal = t.post(&nodes, &t.admin, form("proposal", "research", &["intro"])).await;
    assert_eq!(proposal.status(), StatusCode::CREATED);

    let map = body_json(t.get(&format!("/api/v1/programs/{pid}/builder/map"), &t.admin).await).await;
    assert_eq!(map["data"]["edges"], json!([{"from": "intro", "to": "proposal"}]));
    assert_eq!(map["data"]["nodes"].as_array().unwrap().len(), 2);

    let mut events = t.event_bus.subscribe();
    let published = t
        .post(&format!("/api/v1/programs/{pid}/publish"), &t.admin, json!({}))
        .await;
    assert_eq!(published.status(), StatusCode::OK);
    let published = body_json(published).await;
    assert_eq!(published["data"]["playbook_version"]["version"], "PHD.1");

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, event_types::CURRICULUM_PUBLISHED);
    assert_eq!(event.payload["version"], "PHD.1");

    let program = body_json(t.get(&format!("/api/v1/programs/{pid}"), &t.advisor).await).await;
    assert_eq!(
        program["data"]["active_playbook_version_id"],
        published["data"]["playbook_version"]["id"]
    );

    // A student of the program starts on the published version.
    let program_id: DbId = pid.parse().unwrap();
    let ada = t
        .store
        .create_user(&NewUser {
            username: "ada".into(),
            email: "ada@example.edu".into(),
            password_hash: String::new(),
            display_name: "Ada".into(),
            program_id: Some(program_id),
            cohort_id: None,
        })
        .await
        .unwrap();
    add_membership(&t.store, &t.tenant, &ada, Role::Student).await;
    let view = body_json(t.get("/api/v1/nodes/proposal/submission", &ada).await).await;
    assert_eq!(view["data"]["world"], "research");
    assert_eq!(
        view["data"]["playbook_version_id"],
        published["data"]["playbook_version"]["id"]
    );

    // Nothing left to publish.
    let again = t
        .post(&format!("/api/v1/programs/{pid}/publish"), &t.admin, json!({}))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleting_a_prerequisite_names_its_dependents() {
    let t = TestApp::new().await;
    let pid = program(&t).await;
    let nodes = format!("/api/v1/programs/{pid}/builder/nodes");
    t.post(&nodes, &t.admin, info("intro", "w", &[])).await;
    t.post(&nodes, &t.admin, info("next", "w", &["intro"])).await;

    let blocked = t.delete(&format!("{nodes}/intro"), &t.admin).await;
    assert_eq!(blocked.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(blocked).await["offenders"], json!(["next"]));

    assert_eq!(t.delete(&format!("{nodes}/next"), &t.admin).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(t.delete(&format!("{nodes}/intro"), &t.admin).await.status(), StatusCode::NO_CONTENT);
    let listed = body_json(t.get(&nodes, &t.admin).await).await;
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn renaming_through_update_is_rejected() {
    let t = TestApp::new().await;
    let pid = program(&t).await;
    let nodes = format!("/api/v1/programs/{pid}/builder/nodes");
    t.post(&nodes, &t.admin, info("intro", "w", &[])).await;

    let renamed = t
        .put(&format!("{nodes}/intro"), &t.admin, info("renamed", "w", &[]))
        .await;
    assert_eq!(renamed.status(), StatusCode::BAD_REQUEST);

    let retitled = t
        .put(&format!("{nodes}/intro"), &t.admin, info("intro", "welcome", &[]))
        .await;
    assert_eq!(retitled.status(), StatusCode::OK);
    assert_eq!(body_json(retitled).await["data"]["world_key"], "welcome");
}

#[tokio::test]
async fn cyclic_edges_fail_at_publish() {
    let t = TestApp::new().await;
    let pid = program(&t).await;
    let nodes = format!("/api/v1/programs/{pid}/builder/nodes");
    t.post(&nodes, &t.admin, info("a", "w", &[])).await;
    t.post(&nodes, &t.admin, info("b", "w", &[])).await;

    let map = format!("/api/v1/programs/{pid}/builder/map");
    let set = t
        .put(
            &map,
            &t.admin,
            json!({ "edges": [{"from": "a", "to": "b"}, {"from": "b", "to": "a"}] }),
        )
        .await;
    assert_eq!(set.status(), StatusCode::OK);

    let publish = t
        .post(&format!("/api/v1/programs/{pid}/publish"), &t.admin, json!({}))
        .await;
    assert_eq!(publish.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(publish).await["code"], "BAD_CATALOGUE");

    let ghost = t
        .put(&map, &t.admin, json!({ "edges": [{"from": "a", "to": "ghost"}] }))
        .await;
    assert_eq!(ghost.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_admins_edit_the_curriculum() {
    let t = TestApp::new().await;
    let pid = program(&t).await;
    let nodes = format!("/api/v1/programs/{pid}/builder/nodes");

    let denied = t.post(&nodes, &t.advisor, info("x", "w", &[])).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let course = t
        .post(
            "/api/v1/courses",
            &t.instructor,
            json!({ "code": "CS101", "title": {"en": "Programming"}, "credits": 3 }),
        )
        .await;
    assert_eq!(course.status(), StatusCode::FORBIDDEN);
}
