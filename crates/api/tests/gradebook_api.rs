//! HTTP-level tests for enrollment, grading and the cumulative GPA.

mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp};
use serde_json::{json, Value};

struct Graded {
    term_id: String,
    offerings: Vec<String>,
    activities: Vec<String>,
}

async fn id_of(response: axum::http::Response<axum::body::Body>) -> String {
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// One term with a 3-credit and a 4-credit course, the seeded student
/// enrolled in both and one 100-point activity per offering.
async fn setup(t: &TestApp) -> Graded {
    let term_id = id_of(
        t.post(
            "/api/v1/terms",
            &t.admin,
            json!({
                "name": "Autumn",
                "code": "AU25",
                "start_date": "2025-09-01",
                "end_date": "2025-12-19",
            }),
        )
        .await,
    )
    .await;

    let mut offerings = Vec::new();
    let mut activities = Vec::new();
    for (code, credits) in [("MA101", 3), ("PH101", 4)] {
        let course_id = id_of(
            t.post(
                "/api/v1/courses",
                &t.admin,
                json!({ "code": code, "title": {"en": code}, "credits": credits }),
            )
            .await,
        )
        .await;
        let offering_id = id_of(
            t.post(
                "/api/v1/offerings",
                &t.admin,
                json!({
                    "term_id": term_id,
                    "course_id": course_id,
                    "section": "A",
                    "capacity": 30,
                }),
            )
            .await,
        )
        .await;
        let enrolled = t
            .post(
                &format!("/api/v1/offerings/{offering_id}/enrollments"),
                &t.admin,
                json!({ "student_id": t.student.id }),
            )
            .await;
        assert_eq!(enrolled.status(), StatusCode::CREATED);
        let activity_id = id_of(
            t.post(
                &format!("/api/v1/offerings/{offering_id}/activities"),
                &t.instructor,
                json!({ "title": "Final exam", "max_score": 100.0 }),
            )
            .await,
        )
        .await;
        offerings.push(offering_id);
        activities.push(activity_id);
    }
    Graded {
        term_id,
        offerings,
        activities,
    }
}

fn grade_uri(activity: &str, student: impl std::fmt::Display) -> String {
    format!("/api/v1/activities/{activity}/grades/{student}")
}

#[tokio::test]
async fn gpa_counts_closed_terms_only() {
    let t = TestApp::new().await;
    let g = setup(&t).await;

    let first = t
        .put(&grade_uri(&g.activities[0], t.student.id), &t.instructor, json!({ "score": 95.0 }))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["data"]["grade"], "A");
    let second = t
        .put(&grade_uri(&g.activities[1], t.student.id), &t.admin, json!({ "score": 85.0 }))
        .await;
    assert_eq!(body_json(second).await["data"]["grade"], "B");

    let gpa_uri = format!("/api/v1/students/{}/gpa", t.student.id);
    let open = body_json(t.get(&gpa_uri, &t.student).await).await;
    assert_eq!(open["data"]["gpa"], Value::Null);

    let closed = t
        .post(&format!("/api/v1/terms/{}/close", g.term_id), &t.admin, json!({}))
        .await;
    assert_eq!(closed.status(), StatusCode::OK);
    assert_eq!(body_json(closed).await["data"]["is_closed"], true);

    let summary = body_json(t.get(&gpa_uri, &t.student).await).await;
    assert_eq!(summary["data"]["gpa"], 3.43);
    assert_eq!(summary["data"]["credits"], 7);
    assert_eq!(summary["data"]["offerings"].as_array().unwrap().len(), 2);

    // Advisors may read it, other students may not.
    assert_eq!(t.get(&gpa_uri, &t.advisor).await.status(), StatusCode::OK);
    assert_eq!(t.get(&gpa_uri, &t.other_student).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn regrading_replaces_the_entry() {
    let t = TestApp::new().await;
    let g = setup(&t).await;
    let uri = grade_uri(&g.activities[0], t.student.id);

    t.put(&uri, &t.instructor, json!({ "score": 50.0 })).await;
    let regraded = t.put(&uri, &t.instructor, json!({ "score": 91.0 })).await;
    assert_eq!(body_json(regraded).await["data"]["grade"], "A-");

    let book = body_json(
        t.get(&format!("/api/v1/offerings/{}/gradebook", g.offerings[0]), &t.instructor)
            .await,
    )
    .await;
    let entries = book["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["score"], 91.0);
}

#[tokio::test]
async fn invalid_grades_are_rejected() {
    let t = TestApp::new().await;
    let g = setup(&t).await;

    let too_high = t
        .put(&grade_uri(&g.activities[0], t.student.id), &t.instructor, json!({ "score": 101.0 }))
        .await;
    assert_eq!(too_high.status(), StatusCode::BAD_REQUEST);

    let not_enrolled = t
        .put(
            &grade_uri(&g.activities[0], t.other_student.id),
            &t.instructor,
            json!({ "score": 80.0 }),
        )
        .await;
    assert_eq!(not_enrolled.status(), StatusCode::BAD_REQUEST);

    let by_student = t
        .put(&grade_uri(&g.activities[0], t.student.id), &t.student, json!({ "score": 100.0 }))
        .await;
    assert_eq!(by_student.status(), StatusCode::FORBIDDEN);

    let book = t
        .get(&format!("/api/v1/offerings/{}/gradebook", g.offerings[0]), &t.student)
        .await;
    assert_eq!(book.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn custom_schema_applies_to_new_grades() {
    let t = TestApp::new().await;
    let g = setup(&t).await;

    let schema = t
        .put(
            "/api/v1/grading-schema",
            &t.admin,
            json!({ "bands": [
                {"min_percent": 0.0, "letter": "FAIL", "points": 0.0},
                {"min_percent": 50.0, "letter": "PASS", "points": 4.0},
            ]}),
        )
        .await;
    assert_eq!(schema.status(), StatusCode::OK);
    let schema = body_json(schema).await;
    assert_eq!(schema["data"]["bands"][0]["letter"], "PASS");

    let graded = t
        .put(&grade_uri(&g.activities[0], t.student.id), &t.instructor, json!({ "score": 55.0 }))
        .await;
    assert_eq!(body_json(graded).await["data"]["grade"], "PASS");

    let no_floor = t
        .put(
            "/api/v1/grading-schema",
            &t.admin,
            json!({ "bands": [{"min_percent": 50.0, "letter": "PASS", "points": 4.0}] }),
        )
        .await;
    assert_eq!(no_floor.status(), StatusCode::BAD_REQUEST);

    let by_instructor = t
        .put(
            "/api/v1/grading-schema",
            &t.instructor,
            json!({ "bands": [{"min_percent": 0.0, "letter": "P", "points": 4.0}] }),
        )
        .await;
    assert_eq!(by_instructor.status(), StatusCode::FORBIDDEN);
}
