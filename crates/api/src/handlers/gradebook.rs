use axum::extract::{Path, State};
use axum::Json;
use campus_core::gradebook::{Activity, Enrollment, GpaSummary, GradeBand, GradebookEntry, GradingSchema, NewActivity};
use campus_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::Ctx;
use crate::response::{created, Created, DataResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: DbId,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct SchemaRequest {
    pub bands: Vec<GradeBand>,
}

/// POST /api/v1/offerings/{id}/enrollments
pub async fn enroll(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(offering_id): Path<DbId>,
    Json(input): Json<EnrollRequest>,
) -> AppResult<Created<Enrollment>> {
    let enrollment = state
        .gradebook
        .enroll(&ctx, offering_id, input.student_id)
        .await?;
    Ok(created(enrollment))
}

/// POST /api/v1/offerings/{id}/activities
pub async fn create_activity(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(offering_id): Path<DbId>,
    Json(input): Json<NewActivity>,
) -> AppResult<Created<Activity>> {
    let activity = state
        .gradebook
        .create_activity(&ctx, offering_id, &input)
        .await?;
    Ok(created(activity))
}

/// PUT /api/v1/activities/{id}/grades/{student_id}
pub async fn record_grade(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((activity_id, student_id)): Path<(DbId, DbId)>,
    Json(input): Json<GradeRequest>,
) -> AppResult<Json<DataResponse<GradebookEntry>>> {
    let entry = state
        .gradebook
        .record_grade(&ctx, activity_id, student_id, input.score)
        .await?;
    Ok(Json(DataResponse { data: entry }))
}

/// GET /api/v1/offerings/{id}/gradebook
pub async fn gradebook(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(offering_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<GradebookEntry>>>> {
    let entries = state.gradebook.gradebook(&ctx, offering_id).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/v1/students/{id}/gpa
pub async fn gpa(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(student_id): Path<DbId>,
) -> AppResult<Json<DataResponse<GpaSummary>>> {
    let summary = state.gradebook.gpa(&ctx, student_id).await?;
    Ok(Json(DataResponse { data: summary }))
}

/// PUT /api/v1/grading-schema
pub async fn set_schema(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<SchemaRequest>,
) -> AppResult<Json<DataResponse<GradingSchema>>> {
    let schema = GradingSchema {
        tenant_id: ctx.tenant_id,
        bands: input.bands,
    };
    let schema = state.gradebook.set_schema(&ctx, schema).await?;
    Ok(Json(DataResponse { data: schema }))
}
