//! Handlers for programs, courses, the journey-map builder and publishing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use campus_core::curriculum::{
    BuilderMap, BuilderNode, Course, Edge, NewCourse, NewProgram, NodeInput, Program, PublishOutcome,
};
use campus_core::playbook::PlaybookVersion;
use campus_core::types::DbId;
use campus_events::bus::event_types;
use campus_events::PlatformEvent;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::Ctx;
use crate::response::{created, Created, DataResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EdgesRequest {
    pub edges: Vec<Edge>,
}

/// Body of `POST /playbooks`: a raw catalogue document.
#[derive(Debug, Deserialize)]
pub struct InstallPlaybookRequest {
    pub catalogue: serde_json::Value,
    #[serde(default)]
    pub activate: bool,
}

// ---------------------------------------------------------------------------
// Programs and courses
// ---------------------------------------------------------------------------

/// POST /api/v1/programs
pub async fn create_program(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewProgram>,
) -> AppResult<Created<Program>> {
    let program = state.builder.create_program(&ctx, &input).await?;
    Ok(created(program))
}

/// GET /api/v1/programs
pub async fn list_programs(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<Vec<Program>>>> {
    let programs = state.builder.list_programs(&ctx).await?;
    Ok(Json(DataResponse { data: programs }))
}

/// GET /api/v1/programs/{id}
pub async fn get_program(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Program>>> {
    let program = state.builder.program(&ctx, program_id).await?;
    Ok(Json(DataResponse { data: program }))
}

/// POST /api/v1/courses
pub async fn create_course(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewCourse>,
) -> AppResult<Created<Course>> {
    let course = state.builder.create_course(&ctx, &input).await?;
    Ok(created(course))
}

/// GET /api/v1/courses
pub async fn list_courses(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<Vec<Course>>>> {
    let courses = state.builder.list_courses(&ctx).await?;
    Ok(Json(DataResponse { data: courses }))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// GET /api/v1/programs/{id}/builder/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<BuilderNode>>>> {
    let nodes = state.builder.list_nodes(&ctx, program_id).await?;
    Ok(Json(DataResponse { data: nodes }))
}

/// POST /api/v1/programs/{id}/builder/nodes
pub async fn create_node(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
    Json(input): Json<NodeInput>,
) -> AppResult<Created<BuilderNode>> {
    let node = state.builder.create_node(&ctx, program_id, &input).await?;
    Ok(created(node))
}

/// PUT /api/v1/programs/{id}/builder/nodes/{node_id}
pub async fn update_node(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((program_id, node_id)): Path<(DbId, String)>,
    Json(input): Json<NodeInput>,
) -> AppResult<Json<DataResponse<BuilderNode>>> {
    let node = state
        .builder
        .update_node(&ctx, program_id, &node_id, &input)
        .await?;
    Ok(Json(DataResponse { data: node }))
}

/// DELETE /api/v1/programs/{id}/builder/nodes/{node_id}
pub async fn delete_node(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((program_id, node_id)): Path<(DbId, String)>,
) -> AppResult<StatusCode> {
    state.builder.delete_node(&ctx, program_id, &node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/programs/{id}/builder/map
pub async fn get_map(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
) -> AppResult<Json<DataResponse<BuilderMap>>> {
    let map = state.builder.get_map(&ctx, program_id).await?;
    Ok(Json(DataResponse { data: map }))
}

/// PUT /api/v1/programs/{id}/builder/map
///
/// Replaces every prerequisite in the draft with the given edges.
pub async fn set_edges(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
    Json(input): Json<EdgesRequest>,
) -> AppResult<Json<DataResponse<BuilderMap>>> {
    let map = state.builder.set_edges(&ctx, program_id, &input.edges).await?;
    Ok(Json(DataResponse { data: map }))
}

/// POST /api/v1/programs/{id}/publish
pub async fn publish(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(program_id): Path<DbId>,
) -> AppResult<Json<DataResponse<PublishOutcome>>> {
    let outcome = state.builder.publish(&ctx, program_id).await?;
    state.event_bus.publish(
        PlatformEvent::from_context(event_types::CURRICULUM_PUBLISHED, &ctx)
            .with_source("program_version", outcome.program_version.id)
            .with_payload(serde_json::json!({
                "program_id": program_id,
                "version": outcome.playbook_version.version,
                "checksum": outcome.playbook_version.checksum,
            })),
    );
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/playbooks
///
/// Installs a hand-written catalogue without going through the builder.
pub async fn install_playbook(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<InstallPlaybookRequest>,
) -> AppResult<Created<PlaybookVersion>> {
    let raw = input.catalogue.to_string();
    let version = state
        .journey
        .install_playbook(&ctx, raw, input.activate)
        .await?;
    Ok(created(version))
}
