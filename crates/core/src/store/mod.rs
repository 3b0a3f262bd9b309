//! Persistence seams.
//!
//! Engines are written against these traits. `campus-db` implements them on
//! Postgres; [`memory::MemoryStore`] implements them in-process. Every
//! method is tenant-scoped and both implementations must agree on the
//! atomicity each method documents.

pub mod memory;

pub use memory::MemoryStore;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::audit::{AuditEntry, NewAuditEntry};
use crate::curriculum::{
    BuilderNode, Course, NewCourse, NewProgram, NodeInput, Program, ProgramVersion,
};
use crate::error::CoreResult;
use crate::gradebook::{
    Activity, Enrollment, GradeRecord, GradebookEntry, GradingSchema, NewActivity, NewGrade,
};
use crate::journey::model::{
    FormData, FormRevision, InstanceKey, JourneyStateRow, NewNodeEvent, NodeEvent, NodeInstance,
    NodeOutcome, StateChange, UploadFulfilment,
};
use crate::playbook::{NewPlaybookVersion, PlaybookVersion};
use crate::scheduling::conflict::ConflictReport;
use crate::scheduling::model::{
    AcademicTerm, AvailabilityWindow, ClassSession, Cohort, CourseOffering, CourseStaff,
    NewAvailability, NewOffering, NewRoom, NewSession, NewTerm, OfferingProfile, Room,
    ScheduledSession, SessionFilter,
};
use crate::tenancy::{Membership, NewTenant, NewUser, Tenant, User};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cheap liveness probe of the backing store.
    async fn ping(&self) -> CoreResult<()>;

    async fn create_tenant(&self, input: &NewTenant) -> CoreResult<Tenant>;
    async fn tenant(&self, id: DbId) -> CoreResult<Option<Tenant>>;
    /// Soft delete: the row stays, requests against it are refused.
    async fn deactivate_tenant(&self, id: DbId) -> CoreResult<bool>;

    async fn create_user(&self, input: &NewUser) -> CoreResult<User>;
    async fn user(&self, id: DbId) -> CoreResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> CoreResult<Option<User>>;

    /// Insert or replace the membership of `(tenant, user)`.
    async fn upsert_membership(&self, membership: &Membership) -> CoreResult<()>;
    async fn membership(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<Membership>>;
}

// ---------------------------------------------------------------------------
// Journey
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait JourneyStore: Send + Sync {
    async fn insert_playbook_version(
        &self,
        tenant_id: DbId,
        input: &NewPlaybookVersion,
    ) -> CoreResult<PlaybookVersion>;
    async fn playbook_version(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<PlaybookVersion>>;
    /// Make `version_id` the tenant-wide default for users without a program.
    async fn activate_playbook_version(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<()>;
    async fn active_playbook_version(&self, tenant_id: DbId) -> CoreResult<Option<DbId>>;
    /// Version of the user's oldest node instance, if any.
    async fn pinned_version(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<DbId>>;

    /// Idempotent create. The first caller creates the instance in `active`
    /// with `current_rev = 0`, the projection row and the `created` event in
    /// one unit; every caller gets the same instance. The flag is true only
    /// for the creator.
    async fn get_or_create_instance(
        &self,
        key: &InstanceKey,
        actor: DbId,
    ) -> CoreResult<(NodeInstance, bool)>;
    async fn find_instance(&self, key: &InstanceKey) -> CoreResult<Option<NodeInstance>>;
    async fn instance(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<NodeInstance>>;
    async fn list_instances(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<NodeInstance>>;

    /// Append `current_rev + 1` under the instance lock and emit
    /// `form_saved`. Fails with `StateImmutable` outside editable states.
    async fn append_form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        form_data: &FormData,
        actor: DbId,
    ) -> CoreResult<NodeInstance>;
    async fn form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        rev: i32,
    ) -> CoreResult<Option<FormRevision>>;
    async fn list_form_revisions(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<FormRevision>>;

    /// Replace the fulfilment of `slot_key` and emit `upload_attached`.
    /// Fails with `StateImmutable` outside editable states.
    async fn attach_upload(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        slot_key: &str,
        document_id: DbId,
        actor: DbId,
    ) -> CoreResult<UploadFulfilment>;
    async fn list_uploads(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<UploadFulfilment>>;

    /// Commit a transition: CAS on `state = change.from`, projection upsert,
    /// `state_changed` event and the optional outcome, all or nothing.
    /// `None` means the CAS lost against a concurrent writer.
    async fn commit_transition(&self, change: &StateChange) -> CoreResult<Option<NodeInstance>>;

    async fn append_event(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        event: &NewNodeEvent,
    ) -> CoreResult<NodeEvent>;
    /// Events with `seq > since` in sequence order.
    async fn list_events(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        since: Option<i64>,
    ) -> CoreResult<Vec<NodeEvent>>;
    async fn list_outcomes(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<NodeOutcome>>;

    async fn journey_states(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<JourneyStateRow>>;
    /// Overwrite one projection row. Only reconciliation calls this.
    async fn upsert_journey_state(&self, tenant_id: DbId, row: &JourneyStateRow) -> CoreResult<()>;
    /// Every `done` projection row in the tenant.
    async fn done_states(&self, tenant_id: DbId) -> CoreResult<Vec<JourneyStateRow>>;
    /// Drop a user's instances with their history and projection rows, atomically.
    /// Returns the number of instances removed.
    async fn reset_journey(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<u64>;
}

// ---------------------------------------------------------------------------
// Curriculum
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait CurriculumStore: Send + Sync {
    async fn create_program(&self, tenant_id: DbId, input: &NewProgram) -> CoreResult<Program>;
    async fn program(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Program>>;
    async fn list_programs(&self, tenant_id: DbId) -> CoreResult<Vec<Program>>;

    async fn create_course(&self, tenant_id: DbId, input: &NewCourse) -> CoreResult<Course>;
    async fn course(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Course>>;
    async fn list_courses(&self, tenant_id: DbId) -> CoreResult<Vec<Course>>;

    async fn draft_version(&self, tenant_id: DbId, program_id: DbId) -> CoreResult<Option<ProgramVersion>>;
    async fn latest_published_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
    ) -> CoreResult<Option<ProgramVersion>>;
    /// Create the program's draft, numbered after the latest version, with
    /// the nodes of `copy_from` copied in. A second draft is a `Conflict`.
    async fn create_draft(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        copy_from: Option<DbId>,
    ) -> CoreResult<ProgramVersion>;

    async fn list_builder_nodes(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<Vec<BuilderNode>>;
    async fn insert_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        input: &NodeInput,
    ) -> CoreResult<BuilderNode>;
    async fn update_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
        input: &NodeInput,
    ) -> CoreResult<Option<BuilderNode>>;
    async fn delete_builder_node(&self, tenant_id: DbId, version_id: DbId, node_id: &str) -> CoreResult<bool>;
    /// Replace the prerequisites of every node of the version.
    async fn set_prerequisites(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        prerequisites: &BTreeMap<String, Vec<String>>,
    ) -> CoreResult<()>;

    /// Persist the playbook version, mark the draft published and flip the
    /// program's active pointers in one unit. Fails with `Conflict` when
    /// the version is no longer a draft.
    async fn publish_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        version_id: DbId,
        playbook: &NewPlaybookVersion,
    ) -> CoreResult<(ProgramVersion, PlaybookVersion)>;

    /// Append to the tenant's hash-chained audit log.
    async fn append_audit(&self, tenant_id: DbId, entry: &NewAuditEntry) -> CoreResult<AuditEntry>;
    /// Most recent entries first.
    async fn list_audit(&self, tenant_id: DbId, limit: i64) -> CoreResult<Vec<AuditEntry>>;
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Pure conflict check run by the store under its per-tenant lock.
/// Receives the proposal and the sessions already on the proposal's date
/// (including earlier members of the same batch).
pub type SessionCheck<'a> =
    dyn Fn(&NewSession, &[ScheduledSession]) -> ConflictReport + Send + Sync + 'a;

/// Result of [`SchedulerStore::insert_sessions_checked`].
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Every proposal passed; sessions in proposal order with their reports.
    Inserted(Vec<(ClassSession, ConflictReport)>),
    /// The proposal at `index` hard-conflicted; nothing was written.
    Rejected { index: usize, report: ConflictReport },
}

#[async_trait::async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn create_term(&self, tenant_id: DbId, input: &NewTerm) -> CoreResult<AcademicTerm>;
    async fn term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>>;
    async fn list_terms(&self, tenant_id: DbId) -> CoreResult<Vec<AcademicTerm>>;
    async fn close_term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>>;

    async fn create_room(&self, tenant_id: DbId, input: &NewRoom) -> CoreResult<Room>;
    async fn room(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Room>>;
    async fn list_rooms(&self, tenant_id: DbId) -> CoreResult<Vec<Room>>;

    async fn create_cohort(&self, tenant_id: DbId, name: &str) -> CoreResult<Cohort>;
    async fn list_cohorts(&self, tenant_id: DbId) -> CoreResult<Vec<Cohort>>;

    async fn create_offering(&self, tenant_id: DbId, input: &NewOffering) -> CoreResult<CourseOffering>;
    async fn offering(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<CourseOffering>>;
    async fn list_offerings(&self, tenant_id: DbId, term_id: Option<DbId>) -> CoreResult<Vec<CourseOffering>>;
    /// Insert or replace the staff row of `(offering, user)`.
    async fn upsert_staff(&self, tenant_id: DbId, staff: &CourseStaff) -> CoreResult<CourseStaff>;
    async fn link_cohort(&self, tenant_id: DbId, offering_id: DbId, cohort_id: DbId) -> CoreResult<()>;

    async fn add_availability(&self, tenant_id: DbId, input: &NewAvailability) -> CoreResult<AvailabilityWindow>;
    async fn list_availability(&self, tenant_id: DbId) -> CoreResult<Vec<AvailabilityWindow>>;

    async fn offering_profile(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Option<OfferingProfile>>;
    async fn offering_profiles(&self, tenant_id: DbId, term_id: DbId) -> CoreResult<Vec<OfferingProfile>>;

    async fn list_sessions(&self, tenant_id: DbId, filter: &SessionFilter) -> CoreResult<Vec<ClassSession>>;
    /// Sessions dated within `[start, end]`, joined with staff and cohorts.
    async fn scheduled_sessions(
        &self,
        tenant_id: DbId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<ScheduledSession>>;
    /// Check and insert a batch under the per-tenant session lock, so that
    /// detection and insert are linearizable across concurrent creators.
    async fn insert_sessions_checked(
        &self,
        tenant_id: DbId,
        proposals: &[NewSession],
        check: &SessionCheck<'_>,
    ) -> CoreResult<BatchOutcome>;
    async fn delete_session(&self, tenant_id: DbId, id: DbId) -> CoreResult<bool>;
}

// ---------------------------------------------------------------------------
// Gradebook
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait GradebookStore: Send + Sync {
    async fn enroll(&self, tenant_id: DbId, offering_id: DbId, student_id: DbId) -> CoreResult<Enrollment>;
    async fn list_enrollments(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<Enrollment>>;

    async fn create_activity(
        &self,
        tenant_id: DbId,
        offering_id: DbId,
        input: &NewActivity,
    ) -> CoreResult<Activity>;
    async fn activity(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Activity>>;

    /// Insert or replace the entry of `(activity, student)`.
    async fn upsert_grade(&self, tenant_id: DbId, input: &NewGrade) -> CoreResult<GradebookEntry>;
    async fn list_gradebook(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<GradebookEntry>>;
    /// Every graded entry of the student joined with course credits and the
    /// term's closed flag.
    async fn student_grade_records(&self, tenant_id: DbId, student_id: DbId) -> CoreResult<Vec<GradeRecord>>;

    async fn grading_schema(&self, tenant_id: DbId) -> CoreResult<Option<GradingSchema>>;
    async fn set_grading_schema(&self, schema: &GradingSchema) -> CoreResult<()>;
}

/// Everything the engines need from one backend.
pub trait Store: IdentityStore + JourneyStore + CurriculumStore + SchedulerStore + GradebookStore {}

impl<T> Store for T where
    T: IdentityStore + JourneyStore + CurriculumStore + SchedulerStore + GradebookStore + ?Sized
{
}
