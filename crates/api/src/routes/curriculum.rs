//! Route definitions for programs, courses and the journey-map builder.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::curriculum;
use crate::state::AppState;

/// Routes mounted at `/programs`.
///
/// ```text
/// GET    /                              -> list_programs
/// POST   /                              -> create_program
/// GET    /{id}                          -> get_program
/// GET    /{id}/builder/nodes            -> list_nodes
/// POST   /{id}/builder/nodes            -> create_node
/// PUT    /{id}/builder/nodes/{node_id}  -> update_node
/// DELETE /{id}/builder/nodes/{node_id}  -> delete_node
/// GET    /{id}/builder/map              -> get_map
/// PUT    /{id}/builder/map              -> set_edges
/// POST   /{id}/publish                  -> publish
/// ```
pub fn programs_router() -> Router<AppState> {
    Router::new()
        .route("/", get(curriculum::list_programs).post(curriculum::create_program))
        .route("/{id}", get(curriculum::get_program))
        .route(
            "/{id}/builder/nodes",
            get(curriculum::list_nodes).post(curriculum::create_node),
        )
        .route(
            "/{id}/builder/nodes/{node_id}",
            put(curriculum::update_node).delete(curriculum::delete_node),
        )
        .route("/{id}/builder/map", get(curriculum::get_map).put(curriculum::set_edges))
        .route("/{id}/publish", post(curriculum::publish))
}

/// Routes mounted at `/courses`.
pub fn courses_router() -> Router<AppState> {
    Router::new().route("/", get(curriculum::list_courses).post(curriculum::create_course))
}

/// Routes mounted at `/playbooks`.
pub fn playbooks_router() -> Router<AppState> {
    Router::new().route("/", post(curriculum::install_playbook))
}
