//! Route definitions for reviewer and admin views of one student.

use axum::routing::{get, patch};
use axum::Router;

use crate::handlers::{gradebook, journey};
use crate::state::AppState;

/// Routes mounted at `/students`.
///
/// ```text
/// PATCH /{id}/nodes/{node_id}/state  -> transition_student
/// GET   /{id}/journey/state          -> student_state
/// GET   /{id}/gpa                    -> gpa
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/nodes/{node_id}/state", patch(journey::transition_student))
        .route("/{id}/journey/state", get(journey::student_state))
        .route("/{id}/gpa", get(gradebook::gpa))
}
