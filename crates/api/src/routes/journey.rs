//! Route definitions for student journeys.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::journey;
use crate::state::AppState;

/// Routes mounted at `/nodes`, acting on the caller's own journey.
///
/// ```text
/// GET   /{node_id}/submission   -> get_submission
/// PUT   /{node_id}/submission   -> put_submission
/// PATCH /{node_id}/state        -> transition_own
/// POST  /{node_id}/uploads      -> attach_upload
/// POST  /{node_id}/comments     -> add_comment
/// GET   /{node_id}/events       -> list_events
/// ```
pub fn nodes_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{node_id}/submission",
            get(journey::get_submission).put(journey::put_submission),
        )
        .route("/{node_id}/state", patch(journey::transition_own))
        .route("/{node_id}/uploads", post(journey::attach_upload))
        .route("/{node_id}/comments", post(journey::add_comment))
        .route("/{node_id}/events", get(journey::list_events))
}

/// Routes mounted at `/journey`.
///
/// ```text
/// GET  /state            -> own_state
/// GET  /progress         -> own_progress
/// GET  /scoreboard       -> scoreboard
/// POST /reconcile/{id}   -> reconcile (admin)
/// POST /reset/{id}       -> reset (admin)
/// ```
pub fn journey_router() -> Router<AppState> {
    Router::new()
        .route("/state", get(journey::own_state))
        .route("/progress", get(journey::own_progress))
        .route("/scoreboard", get(journey::scoreboard))
        .route("/reconcile/{id}", post(journey::reconcile))
        .route("/reset/{id}", post(journey::reset))
}
