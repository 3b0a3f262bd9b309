//! Handlers for a student's journey: submissions, transitions, uploads,
//! comments, event feeds and progress, plus the reviewer and admin paths
//! that act on another student's journey.

use axum::extract::{Path, Query, State};
use axum::Json;
use campus_core::journey::model::JourneyStateRow;
use campus_core::journey::{
    FormData, JourneyProgress, NodeEvent, NodeInstance, NodeState, Scoreboard, SubmissionView,
};
use campus_core::types::DbId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::Ctx;
use crate::query::SinceParams;
use crate::response::{created, Created, DataResponse};
use crate::state::AppState;

/// Request body for `PUT /nodes/{nodeId}/submission`.
#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub form_data: FormData,
    /// Optional state to move to after saving, e.g. `submitted`.
    #[serde(default)]
    pub state: Option<NodeState>,
}

/// Request body for both state-change endpoints.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub state: NodeState,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub slot_key: String,
    pub document_id: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Own journey
// ---------------------------------------------------------------------------

/// GET /api/v1/nodes/{node_id}/submission
pub async fn get_submission(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
) -> AppResult<Json<DataResponse<SubmissionView>>> {
    let view = state.journey.open_node(&ctx, ctx.user_id, &node_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// PUT /api/v1/nodes/{node_id}/submission
pub async fn put_submission(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
    Json(input): Json<SubmissionRequest>,
) -> AppResult<Json<DataResponse<SubmissionView>>> {
    let view = state
        .journey
        .put_submission(&ctx, &node_id, &input.form_data, input.state)
        .await?;
    Ok(Json(DataResponse { data: view }))
}

/// PATCH /api/v1/nodes/{node_id}/state
pub async fn transition_own(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
    Json(input): Json<TransitionRequest>,
) -> AppResult<Json<DataResponse<NodeInstance>>> {
    let instance = state
        .journey
        .transition(&ctx, ctx.user_id, &node_id, input.state, input.note.as_deref())
        .await?;
    Ok(Json(DataResponse { data: instance }))
}

/// POST /api/v1/nodes/{node_id}/uploads
pub async fn attach_upload(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
    Json(input): Json<UploadRequest>,
) -> AppResult<Json<DataResponse<SubmissionView>>> {
    let view = state
        .journey
        .attach_upload(&ctx, &node_id, &input.slot_key, input.document_id)
        .await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/nodes/{node_id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
    Json(input): Json<CommentRequest>,
) -> AppResult<Created<NodeEvent>> {
    input.validate()?;
    let event = state
        .journey
        .add_comment(&ctx, ctx.user_id, &node_id, &input.text)
        .await?;
    Ok(created(event))
}

/// GET /api/v1/nodes/{node_id}/events?since=
pub async fn list_events(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(node_id): Path<String>,
    Query(params): Query<SinceParams>,
) -> AppResult<Json<DataResponse<Vec<NodeEvent>>>> {
    let events = state
        .journey
        .events(&ctx, ctx.user_id, &node_id, params.since)
        .await?;
    Ok(Json(DataResponse { data: events }))
}

/// GET /api/v1/journey/state
pub async fn own_state(
    State(state): State<AppState>,
    ctx: Ctx,
) -> AppResult<Json<DataResponse<Vec<JourneyStateRow>>>> {
    let rows = state.journey.journey_state(&ctx, ctx.user_id).await?;
    Ok(Json(DataResponse { data: rows }))
}

/// GET /api/v1/journey/progress
pub async fn own_progress(
    State(state): State<AppState>,
    ctx: Ctx,
) -> AppResult<Json<DataResponse<JourneyProgress>>> {
    let progress = state.journey.progress(&ctx, ctx.user_id).await?;
    Ok(Json(DataResponse { data: progress }))
}

/// GET /api/v1/journey/scoreboard
pub async fn scoreboard(
    State(state): State<AppState>,
    ctx: Ctx,
) -> AppResult<Json<DataResponse<Scoreboard>>> {
    let board = state.journey.scoreboard(&ctx).await?;
    Ok(Json(DataResponse { data: board }))
}

// ---------------------------------------------------------------------------
// Reviewer / admin paths
// ---------------------------------------------------------------------------

/// PATCH /api/v1/students/{user_id}/nodes/{node_id}/state
pub async fn transition_student(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((user_id, node_id)): Path<(DbId, String)>,
    Json(input): Json<TransitionRequest>,
) -> AppResult<Json<DataResponse<NodeInstance>>> {
    let instance = state
        .journey
        .transition(&ctx, user_id, &node_id, input.state, input.note.as_deref())
        .await?;
    Ok(Json(DataResponse { data: instance }))
}

/// GET /api/v1/students/{user_id}/journey/state
pub async fn student_state(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<JourneyStateRow>>>> {
    let rows = state.journey.journey_state(&ctx, user_id).await?;
    Ok(Json(DataResponse { data: rows }))
}

/// POST /api/v1/journey/reconcile/{user_id}
///
/// Returns the projection rows that were rewritten.
pub async fn reconcile(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<JourneyStateRow>>>> {
    let healed = state.journey.reconcile(&ctx, user_id).await?;
    if !healed.is_empty() {
        tracing::warn!(
            tenant_id = %ctx.tenant_id,
            user_id = %user_id,
            healed = healed.len(),
            correlation_id = %ctx.correlation_id,
            "Journey projection healed",
        );
    }
    Ok(Json(DataResponse { data: healed }))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub removed_instances: u64,
}

/// POST /api/v1/journey/reset/{user_id}
pub async fn reset(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ResetResponse>>> {
    let removed_instances = state.journey.reset(&ctx, user_id).await?;
    Ok(Json(DataResponse {
        data: ResetResponse { removed_instances },
    }))
}
