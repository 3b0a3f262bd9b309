//! Handlers for scheduler reference data, class sessions and auto-scheduler
//! runs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use campus_core::scheduling::{
    AcademicTerm, AutoScheduleOutcome, AutoScheduleRequest, AvailabilityWindow, ClassSession,
    Cohort, CourseOffering, CourseStaff, NewAvailability, NewOffering, NewRoom, NewSession,
    NewStaff, NewTerm, Room, SessionFilter, Warning,
};
use campus_core::types::DbId;
use campus_events::bus::event_types;
use campus_events::PlatformEvent;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::Ctx;
use crate::query::TermParams;
use crate::response::{created, Created, DataResponse, WarnedResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewCohortRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkCohortRequest {
    pub cohort_id: DbId,
}

// ---------------------------------------------------------------------------
// Terms, rooms, cohorts
// ---------------------------------------------------------------------------

/// POST /api/v1/terms
pub async fn create_term(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewTerm>,
) -> AppResult<Created<AcademicTerm>> {
    Ok(created(state.scheduler.create_term(&ctx, &input).await?))
}

/// GET /api/v1/terms
pub async fn list_terms(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<Vec<AcademicTerm>>>> {
    let terms = state.scheduler.list_terms(&ctx).await?;
    Ok(Json(DataResponse { data: terms }))
}

/// POST /api/v1/terms/{id}/close
///
/// Grades of a closed term count towards the cumulative GPA.
pub async fn close_term(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(term_id): Path<DbId>,
) -> AppResult<Json<DataResponse<AcademicTerm>>> {
    let term = state.scheduler.close_term(&ctx, term_id).await?;
    Ok(Json(DataResponse { data: term }))
}

/// POST /api/v1/rooms
pub async fn create_room(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewRoom>,
) -> AppResult<Created<Room>> {
    Ok(created(state.scheduler.create_room(&ctx, &input).await?))
}

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<Vec<Room>>>> {
    let rooms = state.scheduler.list_rooms(&ctx).await?;
    Ok(Json(DataResponse { data: rooms }))
}

/// POST /api/v1/cohorts
pub async fn create_cohort(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewCohortRequest>,
) -> AppResult<Created<Cohort>> {
    Ok(created(state.scheduler.create_cohort(&ctx, &input.name).await?))
}

/// GET /api/v1/cohorts
pub async fn list_cohorts(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<Vec<Cohort>>>> {
    let cohorts = state.scheduler.list_cohorts(&ctx).await?;
    Ok(Json(DataResponse { data: cohorts }))
}

// ---------------------------------------------------------------------------
// Offerings
// ---------------------------------------------------------------------------

/// POST /api/v1/offerings
pub async fn create_offering(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewOffering>,
) -> AppResult<Created<CourseOffering>> {
    Ok(created(state.scheduler.create_offering(&ctx, &input).await?))
}

/// GET /api/v1/offerings?term_id=
pub async fn list_offerings(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(params): Query<TermParams>,
) -> AppResult<Json<DataResponse<Vec<CourseOffering>>>> {
    let offerings = state.scheduler.list_offerings(&ctx, params.term_id).await?;
    Ok(Json(DataResponse { data: offerings }))
}

/// POST /api/v1/offerings/{id}/staff
pub async fn add_staff(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(offering_id): Path<DbId>,
    Json(input): Json<NewStaff>,
) -> AppResult<Json<DataResponse<CourseStaff>>> {
    let staff = state.scheduler.add_staff(&ctx, offering_id, &input).await?;
    Ok(Json(DataResponse { data: staff }))
}

/// POST /api/v1/offerings/{id}/cohorts
pub async fn link_cohort(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(offering_id): Path<DbId>,
    Json(input): Json<LinkCohortRequest>,
) -> AppResult<StatusCode> {
    state
        .scheduler
        .link_cohort(&ctx, offering_id, input.cohort_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/availability
pub async fn add_availability(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewAvailability>,
) -> AppResult<Created<AvailabilityWindow>> {
    Ok(created(state.scheduler.add_availability(&ctx, &input).await?))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions
///
/// 201 with soft `warnings`; 409 with the conflict kind and offending
/// session ids on a hard conflict.
pub async fn create_session(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<NewSession>,
) -> AppResult<(StatusCode, Json<WarnedResponse<ClassSession, Warning>>)> {
    let created = state.scheduler.create_session(&ctx, &input).await?;
    state.event_bus.publish(
        PlatformEvent::from_context(event_types::SESSIONS_CREATED, &ctx)
            .with_source("class_session", created.session.id)
            .with_payload(serde_json::json!({
                "offering_id": created.session.offering_id,
                "count": 1,
            })),
    );
    Ok((
        StatusCode::CREATED,
        Json(WarnedResponse {
            data: created.session,
            warnings: created.warnings,
        }),
    ))
}

/// GET /api/v1/sessions?offering_id=&start=&end=
pub async fn list_sessions(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(filter): Query<SessionFilter>,
) -> AppResult<Json<DataResponse<Vec<ClassSession>>>> {
    let sessions = state.scheduler.list_sessions(&ctx, &filter).await?;
    Ok(Json(DataResponse { data: sessions }))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(session_id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.scheduler.delete_session(&ctx, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/scheduler/auto
///
/// Runs without a `config` use the server's solver defaults.
pub async fn auto_schedule(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(mut input): Json<AutoScheduleRequest>,
) -> AppResult<Json<DataResponse<AutoScheduleOutcome>>> {
    if input.config.is_none() {
        input.config = Some(state.config.solver.clone());
    }
    let outcome = state.scheduler.auto_schedule(&ctx, &input).await?;
    if outcome.created_sessions > 0 {
        state.event_bus.publish(
            PlatformEvent::from_context(event_types::SESSIONS_CREATED, &ctx)
                .with_source("academic_term", input.term_id)
                .with_payload(serde_json::json!({ "count": outcome.created_sessions })),
        );
    }
    Ok(Json(DataResponse { data: outcome }))
}
