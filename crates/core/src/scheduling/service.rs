//! Scheduler operations over a store: reference data, checked session
//! creation and auto-scheduler runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::capabilities::{can, Action, Resource};
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::scheduling::conflict::{detect, ConflictReport, Warning};
use crate::scheduling::model::{
    AcademicTerm, AvailabilityWindow, ClassSession, Cohort, CourseOffering, CourseStaff,
    NewAvailability, NewOffering, NewRoom, NewSession, NewStaff, NewTerm, Room, ScheduledSession,
    SessionFilter,
};
use crate::scheduling::solver::{solve, ProblemInstance, SolverConfig, SolverResult};
use crate::store::{BatchOutcome, Store};
use crate::types::DbId;

/// A persisted session and the soft warnings raised while placing it.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session: ClassSession,
    pub warnings: Vec<Warning>,
}

/// Body of `POST /scheduler/auto`.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoScheduleRequest {
    pub term_id: DbId,
    #[serde(default)]
    pub config: Option<SolverConfig>,
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoScheduleOutcome {
    #[serde(flatten)]
    pub result: SolverResult,
    /// Sessions written when the run was applied.
    pub created_sessions: usize,
}

fn conflict_error(report: &ConflictReport) -> CoreError {
    let reason = report.reason();
    CoreError::Conflict {
        message: match reason {
            Some(kind) => format!("Session conflicts on {}", kind.as_str()),
            None => "Session conflicts with an existing session".into(),
        },
        reason: reason.map(|k| k.as_str().to_string()),
        offenders: report.offenders().iter().map(ToString::to_string).collect(),
    }
}

type RunLocks = HashMap<(DbId, DbId), Arc<Mutex<()>>>;

/// Lock for `key`, dropping entries no run holds any more.
///
/// An entry whose only owner is the map is idle: every run keeps its
/// `Arc` until it finishes, so a held or queued lock is never pruned.
fn acquire_run_lock(runs: &mut RunLocks, key: (DbId, DbId)) -> Arc<Mutex<()>> {
    runs.retain(|_, lock| Arc::strong_count(lock) > 1);
    Arc::clone(runs.entry(key).or_default())
}

pub struct Scheduler<S: ?Sized> {
    store: Arc<S>,
    /// One lock per `(tenant, term)`; solver runs on the same term queue.
    runs: Mutex<RunLocks>,
}

impl<S: Store + ?Sized> Scheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            runs: Mutex::new(HashMap::new()),
        }
    }

    // -- Reference data -----------------------------------------------------

    pub async fn create_term(&self, ctx: &RequestContext, input: &NewTerm) -> CoreResult<AcademicTerm> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        self.store.create_term(ctx.tenant_id, input).await
    }

    pub async fn list_terms(&self, ctx: &RequestContext) -> CoreResult<Vec<AcademicTerm>> {
        can(ctx, Action::ViewSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.list_terms(ctx.tenant_id).await
    }

    /// Close a term; its graded offerings start counting towards GPA.
    pub async fn close_term(&self, ctx: &RequestContext, term_id: DbId) -> CoreResult<AcademicTerm> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        let term = self
            .store
            .close_term(ctx.tenant_id, term_id)
            .await?
            .ok_or_else(|| CoreError::not_found("term", term_id))?;
        tracing::info!(tenant_id = %ctx.tenant_id, term_id = %term_id, "Term closed");
        Ok(term)
    }

    pub async fn create_room(&self, ctx: &RequestContext, input: &NewRoom) -> CoreResult<Room> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        self.store.create_room(ctx.tenant_id, input).await
    }

    pub async fn list_rooms(&self, ctx: &RequestContext) -> CoreResult<Vec<Room>> {
        can(ctx, Action::ViewSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.list_rooms(ctx.tenant_id).await
    }

    pub async fn create_cohort(&self, ctx: &RequestContext, name: &str) -> CoreResult<Cohort> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::BadInput("Cohort name is required".into()));
        }
        ctx.checkpoint()?;
        self.store.create_cohort(ctx.tenant_id, name).await
    }

    pub async fn list_cohorts(&self, ctx: &RequestContext) -> CoreResult<Vec<Cohort>> {
        can(ctx, Action::ViewSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.list_cohorts(ctx.tenant_id).await
    }

    pub async fn create_offering(&self, ctx: &RequestContext, input: &NewOffering) -> CoreResult<CourseOffering> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        self.store.create_offering(ctx.tenant_id, input).await
    }

    pub async fn list_offerings(&self, ctx: &RequestContext, term_id: Option<DbId>) -> CoreResult<Vec<CourseOffering>> {
        can(ctx, Action::ViewSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.list_offerings(ctx.tenant_id, term_id).await
    }

    pub async fn add_staff(&self, ctx: &RequestContext, offering_id: DbId, input: &NewStaff) -> CoreResult<CourseStaff> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        if self.store.membership(ctx.tenant_id, input.user_id).await?.is_none() {
            return Err(CoreError::not_found("user", input.user_id));
        }
        self.store
            .upsert_staff(
                ctx.tenant_id,
                &CourseStaff {
                    offering_id,
                    user_id: input.user_id,
                    role: input.role,
                    is_primary: input.is_primary,
                },
            )
            .await
    }

    pub async fn link_cohort(&self, ctx: &RequestContext, offering_id: DbId, cohort_id: DbId) -> CoreResult<()> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.link_cohort(ctx.tenant_id, offering_id, cohort_id).await
    }

    pub async fn add_availability(&self, ctx: &RequestContext, input: &NewAvailability) -> CoreResult<AvailabilityWindow> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        self.store.add_availability(ctx.tenant_id, input).await
    }

    // -- Sessions -----------------------------------------------------------

    pub async fn list_sessions(&self, ctx: &RequestContext, filter: &SessionFilter) -> CoreResult<Vec<ClassSession>> {
        can(ctx, Action::ViewSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.store.list_sessions(ctx.tenant_id, filter).await
    }

    /// Detect and insert under the store's per-tenant lock. Hard conflicts
    /// become `Conflict` carrying the kind and the offending session ids.
    pub async fn create_session(&self, ctx: &RequestContext, proposal: &NewSession) -> CoreResult<CreatedSession> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        proposal.validate()?;
        ctx.checkpoint()?;
        let profile = self
            .store
            .offering_profile(ctx.tenant_id, proposal.offering_id)
            .await?
            .ok_or_else(|| CoreError::not_found("offering", proposal.offering_id))?;
        let room = match proposal.room_id {
            Some(room_id) => Some(
                self.store
                    .room(ctx.tenant_id, room_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("room", room_id))?,
            ),
            None => None,
        };
        let availability = self.store.list_availability(ctx.tenant_id).await?;

        let check = |p: &NewSession, existing: &[ScheduledSession]| detect(p, &profile, room.as_ref(), existing, &availability);
        ctx.checkpoint()?;
        match self
            .store
            .insert_sessions_checked(ctx.tenant_id, std::slice::from_ref(proposal), &check)
            .await?
        {
            BatchOutcome::Inserted(mut rows) => {
                let (session, report) = rows
                    .pop()
                    .ok_or_else(|| CoreError::Storage("Session insert returned no row".into()))?;
                tracing::info!(
                    tenant_id = %ctx.tenant_id,
                    session_id = %session.id,
                    offering_id = %session.offering_id,
                    warnings = report.warnings.len(),
                    "Session created",
                );
                Ok(CreatedSession {
                    session,
                    warnings: report.warnings,
                })
            }
            BatchOutcome::Rejected { report, .. } => {
                tracing::info!(
                    tenant_id = %ctx.tenant_id,
                    offering_id = %proposal.offering_id,
                    reason = ?report.reason(),
                    "Session rejected by conflict check",
                );
                Err(conflict_error(&report))
            }
        }
    }

    pub async fn delete_session(&self, ctx: &RequestContext, session_id: DbId) -> CoreResult<()> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        if self.store.delete_session(ctx.tenant_id, session_id).await? {
            Ok(())
        } else {
            Err(CoreError::not_found("session", session_id))
        }
    }

    // -- Auto-scheduler -----------------------------------------------------

    async fn run_lock(&self, tenant_id: DbId, term_id: DbId) -> Arc<Mutex<()>> {
        let mut runs = self.runs.lock().await;
        acquire_run_lock(&mut runs, (tenant_id, term_id))
    }

    /// Solve the term's offerings that have no sessions yet and, when
    /// `apply` is set, persist every assignment in one checked batch.
    pub async fn auto_schedule(
        &self,
        ctx: &RequestContext,
        request: &AutoScheduleRequest,
    ) -> CoreResult<AutoScheduleOutcome> {
        can(ctx, Action::RunAutoScheduler, Resource::Tenant)?;
        let config = request.config.clone().unwrap_or_default();
        config.validate()?;

        let lock = self.run_lock(ctx.tenant_id, request.term_id).await;
        let _run = lock.lock().await;
        ctx.checkpoint()?;

        let term = self
            .store
            .term(ctx.tenant_id, request.term_id)
            .await?
            .ok_or_else(|| CoreError::not_found("term", request.term_id))?;
        let existing = self
            .store
            .scheduled_sessions(ctx.tenant_id, term.start_date, term.end_date)
            .await?;
        let scheduled: HashSet<DbId> = existing.iter().map(|s| s.offering_id).collect();
        let offerings: Vec<_> = self
            .store
            .offering_profiles(ctx.tenant_id, term.id)
            .await?
            .into_iter()
            .filter(|p| !scheduled.contains(&p.offering_id))
            .collect();
        let rooms = self.store.list_rooms(ctx.tenant_id).await?;
        let availability = self.store.list_availability(ctx.tenant_id).await?;
        ctx.checkpoint()?;

        let profiles: HashMap<DbId, _> = offerings.iter().map(|p| (p.offering_id, p.clone())).collect();
        let room_index: HashMap<DbId, Room> = rooms.iter().map(|r| (r.id, r.clone())).collect();
        let problem = ProblemInstance {
            term,
            offerings,
            rooms,
            existing,
            availability: availability.clone(),
        };
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            term_id = %request.term_id,
            offerings = problem.offerings.len(),
            seed = config.seed,
            "Auto-scheduler run started",
        );

        let cancel = ctx.cancel.clone();
        let result = tokio::task::spawn_blocking(move || solve(&problem, &config, &cancel))
            .await
            .map_err(|e| CoreError::Storage(format!("Solver task failed: {e}")))?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            term_id = %request.term_id,
            status = ?result.status,
            assigned = result.statistics.assigned,
            unassigned = result.unassigned.len(),
            elapsed_ms = result.statistics.elapsed_ms,
            "Auto-scheduler run finished",
        );

        let mut created_sessions = 0;
        if request.apply && !result.assignments.is_empty() {
            can(ctx, Action::ManageSchedule, Resource::Tenant)?;
            ctx.checkpoint()?;
            let proposals = result.proposals();
            let check = |p: &NewSession, existing: &[ScheduledSession]| match profiles.get(&p.offering_id) {
                Some(profile) => detect(
                    p,
                    profile,
                    p.room_id.and_then(|id| room_index.get(&id)),
                    existing,
                    &availability,
                ),
                None => ConflictReport::default(),
            };
            match self
                .store
                .insert_sessions_checked(ctx.tenant_id, &proposals, &check)
                .await?
            {
                BatchOutcome::Inserted(rows) => created_sessions = rows.len(),
                BatchOutcome::Rejected { report, .. } => return Err(conflict_error(&report)),
            }
            tracing::info!(
                tenant_id = %ctx.tenant_id,
                term_id = %request.term_id,
                created_sessions,
                "Auto-scheduler assignments applied",
            );
        }

        Ok(AutoScheduleOutcome {
            result,
            created_sessions,
        })
    }
}
