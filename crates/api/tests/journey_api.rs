//! HTTP-level tests for the student journey endpoints.

mod common;

use axum::http::StatusCode;
use campus_events::bus::event_types;
use common::{body_json, TestApp};
use serde_json::json;

fn catalogue() -> serde_json::Value {
    json!({
        "playbook_id": "phd",
        "version": "v1",
        "worlds": [
            {"id": "w1", "nodes": [
                {"id": "A", "type": "form", "title": {"en": "Research proposal"}},
                {"id": "B", "type": "info", "title": {"en": "Ethics briefing"}, "prerequisites": ["A"]}
            ]}
        ]
    })
}

async fn with_playbook() -> TestApp {
    let t = TestApp::new().await;
    let response = t
        .post(
            "/api/v1/playbooks",
            &t.admin,
            json!({ "catalogue": catalogue(), "activate": true }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    t
}

#[tokio::test]
async fn only_admins_install_playbooks() {
    let t = TestApp::new().await;
    let response = t
        .post("/api/v1/playbooks", &t.advisor, json!({ "catalogue": catalogue() }))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn submit_and_approve_flow() {
    let t = with_playbook().await;
    let mut events = t.event_bus.subscribe();

    let opened = body_json(t.get("/api/v1/nodes/A/submission", &t.student).await).await;
    assert_eq!(opened["data"]["state"], "active");
    assert_eq!(opened["data"]["current_rev"], 0);

    let response = t
        .put(
            "/api/v1/nodes/A/submission",
            &t.student,
            json!({ "form_data": {"topic": "Graph colouring"}, "state": "submitted" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    assert_eq!(submitted["data"]["state"], "submitted");
    assert_eq!(submitted["data"]["current_rev"], 1);
    assert_eq!(submitted["data"]["form"]["data"]["topic"], "Graph colouring");

    // Students cannot approve their own work.
    let own = t
        .patch("/api/v1/nodes/A/state", &t.student, json!({ "state": "done" }))
        .await;
    assert_eq!(own.status(), StatusCode::FORBIDDEN);

    let uri = format!("/api/v1/students/{}/nodes/A/state", t.student.id);
    let approved = t
        .patch(&uri, &t.advisor, json!({ "state": "done", "note": "Well argued" }))
        .await;
    assert_eq!(approved.status(), StatusCode::OK);
    assert_eq!(body_json(approved).await["data"]["state"], "done");

    let progress = body_json(t.get("/api/v1/journey/progress", &t.student).await).await;
    assert_eq!(progress["data"]["done"], 1);
    assert_eq!(progress["data"]["total"], 2);
    assert_eq!(progress["data"]["complete"], false);

    let mut approvals = 0;
    while let Ok(event) = events.try_recv() {
        if event.event_type == event_types::JOURNEY_STATE_CHANGED && event.payload["to"] == "done" {
            assert_eq!(event.actor_user_id, Some(t.advisor.id));
            assert_eq!(event.payload["note"], "Well argued");
            approvals += 1;
        }
    }
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn unmet_prerequisite_is_unprocessable_with_blockers() {
    let t = with_playbook().await;
    t.get("/api/v1/nodes/B/submission", &t.student).await;

    let response = t
        .patch("/api/v1/nodes/B/state", &t.student, json!({ "state": "submitted" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PREREQ_NOT_SATISFIED");
    assert_eq!(json["blocking"], json!(["A"]));

    let state = body_json(t.get("/api/v1/journey/state", &t.student).await).await;
    let b = state["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["node_id"] == "B")
        .unwrap();
    assert_eq!(b["state"], "active");
}

#[tokio::test]
async fn unknown_node_is_not_found() {
    let t = with_playbook().await;
    let response = t.get("/api/v1/nodes/Z/submission", &t.student).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_object_form_data_is_rejected() {
    let t = with_playbook().await;
    t.get("/api/v1/nodes/A/submission", &t.student).await;
    let response = t
        .put("/api/v1/nodes/A/submission", &t.student, json!({ "form_data": [1, 2, 3] }))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn comments_are_validated_and_appear_in_the_feed() {
    let t = with_playbook().await;
    t.get("/api/v1/nodes/A/submission", &t.student).await;

    let empty = t
        .post("/api/v1/nodes/A/comments", &t.student, json!({ "text": "" }))
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let created = t
        .post("/api/v1/nodes/A/comments", &t.student, json!({ "text": "Draft attached" }))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let feed = body_json(t.get("/api/v1/nodes/A/events", &t.student).await).await;
    let feed = feed["data"].as_array().unwrap();
    assert!(feed.len() >= 2);
    assert!(feed.iter().any(|e| e["event_type"] == "comment_added"));
}

#[tokio::test]
async fn students_cannot_read_each_others_journeys() {
    let t = with_playbook().await;
    t.get("/api/v1/nodes/A/submission", &t.student).await;

    let uri = format!("/api/v1/students/{}/journey/state", t.student.id);
    let peer = t.get(&uri, &t.other_student).await;
    assert_eq!(peer.status(), StatusCode::FORBIDDEN);

    let advisor = t.get(&uri, &t.advisor).await;
    assert_eq!(advisor.status(), StatusCode::OK);
}

#[tokio::test]
async fn reconcile_is_admin_only_and_idempotent() {
    let t = with_playbook().await;
    t.get("/api/v1/nodes/A/submission", &t.student).await;
    let uri = format!("/api/v1/journey/reconcile/{}", t.student.id);

    let denied = t.post(&uri, &t.advisor, json!({})).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let healed = t.post(&uri, &t.admin, json!({})).await;
    assert_eq!(healed.status(), StatusCode::OK);
    assert_eq!(body_json(healed).await["data"], json!([]));
}

#[tokio::test]
async fn scoreboard_shows_completed_nodes() {
    let t = with_playbook().await;
    t.put(
        "/api/v1/nodes/A/submission",
        &t.student,
        json!({ "form_data": {"topic": "Graphs"}, "state": "submitted" }),
    )
    .await;
    let uri = format!("/api/v1/students/{}/nodes/A/state", t.student.id);
    assert_eq!(
        t.patch(&uri, &t.advisor, json!({ "state": "done" })).await.status(),
        StatusCode::OK
    );

    let board = body_json(t.get("/api/v1/journey/scoreboard", &t.other_student).await).await;
    assert_eq!(board["data"]["total_users"], 1);
    assert_eq!(board["data"]["average"], 100);
    assert_eq!(board["data"]["top"][0]["name"], "student");
    assert_eq!(board["data"]["top"][0]["total_score"], 100);
    assert_eq!(board["data"]["top"][0]["rank"], 1);
    assert_eq!(board["data"]["me"]["total_score"], 0);
    assert_eq!(board["data"]["me"]["rank"], 2);
}

#[tokio::test]
async fn reset_is_admin_only_and_restarts_the_journey() {
    let t = with_playbook().await;
    t.put(
        "/api/v1/nodes/A/submission",
        &t.student,
        json!({ "form_data": {"topic": "Graphs"}, "state": "submitted" }),
    )
    .await;
    let uri = format!("/api/v1/journey/reset/{}", t.student.id);

    let denied = t.post(&uri, &t.advisor, json!({})).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let reset = t.post(&uri, &t.admin, json!({})).await;
    assert_eq!(reset.status(), StatusCode::OK);
    assert_eq!(body_json(reset).await["data"]["removed_instances"], 1);

    let state = body_json(t.get("/api/v1/journey/state", &t.student).await).await;
    assert_eq!(state["data"], json!([]));
    let reopened = body_json(t.get("/api/v1/nodes/A/submission", &t.student).await).await;
    assert_eq!(reopened["data"]["state"], "active");
    assert_eq!(reopened["data"]["current_rev"], 0);
}
