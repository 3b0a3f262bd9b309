//! Route definitions for the scheduler.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{gradebook, scheduling};
use crate::state::AppState;

/// Routes mounted at `/sessions`.
///
/// ```text
/// GET    /        -> list_sessions
/// POST   /        -> create_session
/// DELETE /{id}    -> delete_session
/// ```
pub fn sessions_router() -> Router<AppState> {
    Router::new()
        .route("/", get(scheduling::list_sessions).post(scheduling::create_session))
        .route("/{id}", delete(scheduling::delete_session))
}

/// Routes mounted at `/terms`.
///
/// ```text
/// GET  /             -> list_terms
/// POST /             -> create_term
/// POST /{id}/close   -> close_term
/// ```
pub fn terms_router() -> Router<AppState> {
    Router::new()
        .route("/", get(scheduling::list_terms).post(scheduling::create_term))
        .route("/{id}/close", post(scheduling::close_term))
}

/// Routes mounted at `/offerings`, including the gradebook sub-resources.
///
/// ```text
/// GET  /                    -> list_offerings
/// POST /                    -> create_offering
/// POST /{id}/staff          -> add_staff
/// POST /{id}/cohorts        -> link_cohort
/// POST /{id}/enrollments    -> enroll
/// POST /{id}/activities     -> create_activity
/// GET  /{id}/gradebook      -> gradebook
/// ```
pub fn offerings_router() -> Router<AppState> {
    Router::new()
        .route("/", get(scheduling::list_offerings).post(scheduling::create_offering))
        .route("/{id}/staff", post(scheduling::add_staff))
        .route("/{id}/cohorts", post(scheduling::link_cohort))
        .route("/{id}/enrollments", post(gradebook::enroll))
        .route("/{id}/activities", post(gradebook::create_activity))
        .route("/{id}/gradebook", get(gradebook::gradebook))
}

/// Flat reference-data routes merged at the API root.
///
/// ```text
/// GET/POST /rooms            -> list_rooms, create_room
/// GET/POST /cohorts          -> list_cohorts, create_cohort
/// POST     /availability     -> add_availability
/// POST     /scheduler/auto   -> auto_schedule
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(scheduling::list_rooms).post(scheduling::create_room))
        .route("/cohorts", get(scheduling::list_cohorts).post(scheduling::create_cohort))
        .route("/availability", post(scheduling::add_availability))
        .route("/scheduler/auto", post(scheduling::auto_schedule))
}
