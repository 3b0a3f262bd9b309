use axum::routing::put;
use axum::Router;

use crate::handlers::gradebook;
use crate::state::AppState;

/// Gradebook routes not scoped to an offering.
///
/// ```text
/// PUT /activities/{id}/grades/{student_id}  -> record_grade
/// PUT /grading-schema                       -> set_schema
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activities/{id}/grades/{student_id}", put(gradebook::record_grade))
        .route("/grading-schema", put(gradebook::set_schema))
}
