pub mod auth;
pub mod curriculum;
pub mod gradebook;
pub mod health;
pub mod journey;
pub mod scheduling;
pub mod students;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                                  login (public)
/// /users/me                                    caller profile
///
/// /nodes/{node_id}/...                         own journey nodes
/// /journey/state | progress | scoreboard | reconcile/{id} | reset/{id}
/// /students/{id}/...                           reviewer paths, GPA
///
/// /sessions, /terms, /offerings                scheduler resources
/// /rooms, /cohorts, /availability              scheduler reference data
/// /scheduler/auto                              auto-scheduler run
///
/// /programs/{id}/builder/...                   journey-map builder
/// /courses, /playbooks                         catalogue authoring
///
/// /activities/{id}/grades/{student_id}         grade entry
/// /grading-schema                              tenant grading bands
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", auth::users_router())
        // Student journey.
        .nest("/nodes", journey::nodes_router())
        .nest("/journey", journey::journey_router())
        .nest("/students", students::router())
        // Scheduler.
        .nest("/sessions", scheduling::sessions_router())
        .nest("/terms", scheduling::terms_router())
        .nest("/offerings", scheduling::offerings_router())
        .merge(scheduling::router())
        // Curriculum.
        .nest("/programs", curriculum::programs_router())
        .nest("/courses", curriculum::courses_router())
        .nest("/playbooks", curriculum::playbooks_router())
        // Gradebook.
        .merge(gradebook::router())
}
