//! In-process store.
//!
//! All state sits behind one async mutex, which makes every trait method
//! trivially atomic and every per-instance or per-tenant sequence
//! linearizable. Used by the test suites and by the API when started with
//! `DATABASE_URL=memory://`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::audit::{compute_integrity_hash, AuditEntry, NewAuditEntry};
use crate::curriculum::{
    BuilderNode, Course, NewCourse, NewProgram, NodeInput, Program, ProgramVersion, VersionStatus,
};
use crate::error::{CoreError, CoreResult};
use crate::gradebook::{
    Activity, Enrollment, EnrollmentStatus, GradeRecord, GradebookEntry, GradingSchema,
    NewActivity, NewGrade,
};
use crate::journey::model::{
    EventType, FormData, FormRevision, InstanceKey, JourneyStateRow, NewNodeEvent, NodeEvent,
    NodeInstance, NodeOutcome, StateChange, UploadFulfilment,
};
use crate::journey::state::NodeState;
use crate::playbook::{NewPlaybookVersion, PlaybookVersion};
use crate::scheduling::model::{
    AcademicTerm, AvailabilityWindow, ClassSession, Cohort, CourseOffering, CourseStaff,
    NewAvailability, NewOffering, NewRoom, NewSession, NewTerm, OfferingProfile, Room,
    ScheduledSession, SessionFilter,
};
use crate::store::{
    BatchOutcome, CurriculumStore, GradebookStore, IdentityStore, JourneyStore, SchedulerStore,
    SessionCheck,
};
use crate::tenancy::{Membership, NewTenant, NewUser, Tenant, User};
use crate::types::{new_id, now, DbId, Timestamp};

#[derive(Default)]
struct MemoryState {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    memberships: HashMap<(DbId, DbId), Membership>,

    playbook_versions: Vec<PlaybookVersion>,
    active_playbook: HashMap<DbId, DbId>,
    instances: Vec<NodeInstance>,
    revisions: Vec<FormRevision>,
    uploads: Vec<UploadFulfilment>,
    events: Vec<NodeEvent>,
    outcomes: Vec<NodeOutcome>,
    journey: BTreeMap<(DbId, DbId, String), JourneyStateRow>,

    programs: Vec<Program>,
    courses: Vec<Course>,
    versions: Vec<ProgramVersion>,
    builder_nodes: Vec<BuilderNode>,
    audit: Vec<AuditEntry>,

    terms: Vec<AcademicTerm>,
    rooms: Vec<Room>,
    cohorts: Vec<Cohort>,
    offerings: Vec<CourseOffering>,
    staff: Vec<(DbId, CourseStaff)>,
    offering_cohorts: Vec<(DbId, DbId, DbId)>,
    availability: Vec<AvailabilityWindow>,
    sessions: Vec<ClassSession>,

    enrollments: Vec<Enrollment>,
    activities: Vec<Activity>,
    grades: Vec<GradebookEntry>,
    schemas: HashMap<DbId, GradingSchema>,
}

impl MemoryState {
    fn instance_mut(&mut self, tenant_id: DbId, id: DbId) -> CoreResult<&mut NodeInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.tenant_id == tenant_id && i.id == id)
            .ok_or_else(|| CoreError::not_found("node_instance", id))
    }

    fn owns_instance(&self, tenant_id: DbId, id: DbId) -> bool {
        self.instances.iter().any(|i| i.tenant_id == tenant_id && i.id == id)
    }

    fn push_event(
        &mut self,
        instance_id: DbId,
        event_type: EventType,
        transition: Option<(NodeState, NodeState)>,
        actor: DbId,
        payload: serde_json::Value,
        at: Timestamp,
    ) -> NodeEvent {
        let seq = self.events.iter().filter(|e| e.instance_id == instance_id).count() as i64 + 1;
        let event = NodeEvent {
            id: new_id(),
            instance_id,
            seq,
            event_type,
            from_state: transition.map(|t| t.0),
            to_state: transition.map(|t| t.1),
            actor,
            payload,
            at,
        };
        self.events.push(event.clone());
        event
    }

    fn set_projection(&mut self, tenant_id: DbId, row: JourneyStateRow) {
        self.journey
            .insert((tenant_id, row.user_id, row.node_id.clone()), row);
    }

    fn version(&self, tenant_id: DbId, id: DbId) -> Option<&ProgramVersion> {
        self.versions.iter().find(|v| v.tenant_id == tenant_id && v.id == id)
    }

    fn offering(&self, tenant_id: DbId, id: DbId) -> Option<&CourseOffering> {
        self.offerings.iter().find(|o| o.tenant_id == tenant_id && o.id == id)
    }

    fn profile(&self, tenant_id: DbId, offering_id: DbId) -> Option<OfferingProfile> {
        let offering = self.offering(tenant_id, offering_id)?;
        let staff: Vec<CourseStaff> = self
            .staff
            .iter()
            .filter(|(t, s)| *t == tenant_id && s.offering_id == offering_id)
            .map(|(_, s)| s.clone())
            .collect();
        let cohorts = self
            .offering_cohorts
            .iter()
            .filter(|(t, o, _)| *t == tenant_id && *o == offering_id)
            .map(|(_, _, c)| *c)
            .collect();
        let enrolled = self
            .enrollments
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.offering_id == offering_id
                    && e.status != EnrollmentStatus::Dropped
            })
            .count() as i64;
        Some(OfferingProfile::from_parts(offering, &staff, cohorts, enrolled))
    }

    fn scheduled(&self, tenant_id: DbId, start: NaiveDate, end: NaiveDate) -> Vec<ScheduledSession> {
        let mut profiles: HashMap<DbId, Option<OfferingProfile>> = HashMap::new();
        let mut out = Vec::new();
        for s in self
            .sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.date >= start && s.date <= end)
        {
            let profile = profiles
                .entry(s.offering_id)
                .or_insert_with(|| self.profile(tenant_id, s.offering_id));
            if let Some(p) = profile {
                out.push(ScheduledSession::from_session(s, p));
            }
        }
        out
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl IdentityStore for MemoryStore {
    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn create_tenant(&self, input: &NewTenant) -> CoreResult<Tenant> {
        let mut st = self.state.lock().await;
        if st.tenants.iter().any(|t| t.slug == input.slug) {
            return Err(CoreError::conflict(format!("Tenant slug '{}' is taken", input.slug)));
        }
        let tenant = Tenant {
            id: new_id(),
            slug: input.slug.clone(),
            name: input.name.clone(),
            tenant_type: input.tenant_type,
            enabled_services: input.enabled_services.clone(),
            active: true,
            created_at: now(),
        };
        st.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn tenant(&self, id: DbId) -> CoreResult<Option<Tenant>> {
        Ok(self.state.lock().await.tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn deactivate_tenant(&self, id: DbId) -> CoreResult<bool> {
        let mut st = self.state.lock().await;
        match st.tenants.iter_mut().find(|t| t.id == id && t.active) {
            Some(tenant) => {
                tenant.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_user(&self, input: &NewUser) -> CoreResult<User> {
        let mut st = self.state.lock().await;
        if st.users.iter().any(|u| u.username == input.username) {
            return Err(CoreError::conflict(format!("Username '{}' is taken", input.username)));
        }
        let user = User {
            id: new_id(),
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            display_name: input.display_name.clone(),
            program_id: input.program_id,
            specialty: None,
            cohort_id: input.cohort_id,
            active: true,
            created_at: now(),
        };
        st.users.push(user.clone());
        Ok(user)
    }

    async fn user(&self, id: DbId) -> CoreResult<Option<User>> {
        Ok(self.state.lock().await.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn upsert_membership(&self, membership: &Membership) -> CoreResult<()> {
        self.state
            .lock()
            .await
            .memberships
            .insert((membership.tenant_id, membership.user_id), *membership);
        Ok(())
    }

    async fn membership(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<Membership>> {
        Ok(self
            .state
            .lock()
            .await
            .memberships
            .get(&(tenant_id, user_id))
            .copied())
    }
}

// ---------------------------------------------------------------------------
// Journey
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl JourneyStore for MemoryStore {
    async fn insert_playbook_version(
        &self,
        tenant_id: DbId,
        input: &NewPlaybookVersion,
    ) -> CoreResult<PlaybookVersion> {
        let mut st = self.state.lock().await;
        let version = PlaybookVersion {
            id: new_id(),
            tenant_id,
            version: input.version.clone(),
            checksum: input.checksum.clone(),
            raw_json: input.raw_json.clone(),
            created_at: now(),
        };
        st.playbook_versions.push(version.clone());
        Ok(version)
    }

    async fn playbook_version(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<PlaybookVersion>> {
        Ok(self
            .state
            .lock()
            .await
            .playbook_versions
            .iter()
            .find(|v| v.tenant_id == tenant_id && v.id == id)
            .cloned())
    }

    async fn activate_playbook_version(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<()> {
        let mut st = self.state.lock().await;
        if !st
            .playbook_versions
            .iter()
            .any(|v| v.tenant_id == tenant_id && v.id == version_id)
        {
            return Err(CoreError::not_found("playbook_version", version_id));
        }
        st.active_playbook.insert(tenant_id, version_id);
        Ok(())
    }

    async fn active_playbook_version(&self, tenant_id: DbId) -> CoreResult<Option<DbId>> {
        Ok(self.state.lock().await.active_playbook.get(&tenant_id).copied())
    }

    async fn pinned_version(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<DbId>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.user_id == user_id)
            .min_by_key(|i| (i.created_at, i.id))
            .map(|i| i.playbook_version_id))
    }

    async fn get_or_create_instance(
        &self,
        key: &InstanceKey,
        actor: DbId,
    ) -> CoreResult<(NodeInstance, bool)> {
        let mut st = self.state.lock().await;
        if let Some(existing) = st.instances.iter().find(|i| {
            i.tenant_id == key.tenant_id
                && i.user_id == key.user_id
                && i.node_id == key.node_id
                && i.playbook_version_id == key.playbook_version_id
        }) {
            return Ok((existing.clone(), false));
        }

        let at = now();
        let instance = NodeInstance {
            id: new_id(),
            tenant_id: key.tenant_id,
            user_id: key.user_id,
            node_id: key.node_id.clone(),
            playbook_version_id: key.playbook_version_id,
            state: NodeState::Active,
            current_rev: 0,
            state_entered_rev: 0,
            created_at: at,
            updated_at: at,
        };
        st.instances.push(instance.clone());
        st.set_projection(
            key.tenant_id,
            JourneyStateRow {
                user_id: key.user_id,
                node_id: key.node_id.clone(),
                state: NodeState::Active,
                updated_at: at,
            },
        );
        st.push_event(
            instance.id,
            EventType::Created,
            None,
            actor,
            serde_json::json!({ "playbook_version_id": key.playbook_version_id }),
            at,
        );
        Ok((instance, true))
    }

    async fn find_instance(&self, key: &InstanceKey) -> CoreResult<Option<NodeInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .iter()
            .find(|i| {
                i.tenant_id == key.tenant_id
                    && i.user_id == key.user_id
                    && i.node_id == key.node_id
                    && i.playbook_version_id == key.playbook_version_id
            })
            .cloned())
    }

    async fn instance(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<NodeInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .iter()
            .find(|i| i.tenant_id == tenant_id && i.id == id)
            .cloned())
    }

    async fn list_instances(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<NodeInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .instances
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        form_data: &FormData,
        actor: DbId,
    ) -> CoreResult<NodeInstance> {
        let mut st = self.state.lock().await;
        let at = now();
        let instance = st.instance_mut(tenant_id, instance_id)?;
        if !instance.state.is_editable() {
            return Err(CoreError::StateImmutable { state: instance.state });
        }
        instance.current_rev += 1;
        instance.updated_at = at;
        let updated = instance.clone();

        st.revisions.push(FormRevision {
            instance_id,
            rev: updated.current_rev,
            form_data: form_data.clone(),
            edited_by: actor,
            edited_at: at,
        });
        st.push_event(
            instance_id,
            EventType::FormSaved,
            None,
            actor,
            serde_json::json!({ "rev": updated.current_rev }),
            at,
        );
        Ok(updated)
    }

    async fn form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        rev: i32,
    ) -> CoreResult<Option<FormRevision>> {
        let st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Ok(None);
        }
        Ok(st
            .revisions
            .iter()
            .find(|r| r.instance_id == instance_id && r.rev == rev)
            .cloned())
    }

    async fn list_form_revisions(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<FormRevision>> {
        let st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Ok(Vec::new());
        }
        Ok(st
            .revisions
            .iter()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn attach_upload(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        slot_key: &str,
        document_id: DbId,
        actor: DbId,
    ) -> CoreResult<UploadFulfilment> {
        let mut st = self.state.lock().await;
        let at = now();
        let instance = st.instance_mut(tenant_id, instance_id)?;
        if !instance.state.is_editable() {
            return Err(CoreError::StateImmutable { state: instance.state });
        }
        instance.updated_at = at;

        st.uploads
            .retain(|u| !(u.instance_id == instance_id && u.slot_key == slot_key));
        let fulfilment = UploadFulfilment {
            instance_id,
            slot_key: slot_key.to_string(),
            document_id,
            uploaded_by: actor,
            uploaded_at: at,
        };
        st.uploads.push(fulfilment.clone());
        st.push_event(
            instance_id,
            EventType::UploadAttached,
            None,
            actor,
            serde_json::json!({ "slot_key": slot_key, "document_id": document_id }),
            at,
        );
        Ok(fulfilment)
    }

    async fn list_uploads(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<UploadFulfilment>> {
        let st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Ok(Vec::new());
        }
        Ok(st
            .uploads
            .iter()
            .filter(|u| u.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn commit_transition(&self, change: &StateChange) -> CoreResult<Option<NodeInstance>> {
        let mut st = self.state.lock().await;
        let instance = st.instance_mut(change.tenant_id, change.instance_id)?;
        if instance.state != change.from {
            return Ok(None);
        }
        instance.state = change.to;
        instance.state_entered_rev = instance.current_rev;
        instance.updated_at = change.at;
        let updated = instance.clone();

        st.set_projection(
            change.tenant_id,
            JourneyStateRow {
                user_id: change.user_id,
                node_id: change.node_id.clone(),
                state: change.to,
                updated_at: change.at,
            },
        );
        st.push_event(
            change.instance_id,
            EventType::StateChanged,
            Some((change.from, change.to)),
            change.actor,
            change.payload.clone(),
            change.at,
        );
        if let Some((decision, note)) = &change.outcome {
            st.outcomes.push(NodeOutcome {
                id: new_id(),
                instance_id: change.instance_id,
                decision: *decision,
                note: note.clone(),
                decided_by: change.actor,
                decided_at: change.at,
            });
            if let Some(note) = note {
                st.push_event(
                    change.instance_id,
                    EventType::OutcomeRecorded,
                    None,
                    change.actor,
                    serde_json::json!({ "decision": decision.as_str(), "note": note }),
                    change.at,
                );
            }
        }
        Ok(Some(updated))
    }

    async fn append_event(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        event: &NewNodeEvent,
    ) -> CoreResult<NodeEvent> {
        let mut st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Err(CoreError::not_found("node_instance", instance_id));
        }
        Ok(st.push_event(
            instance_id,
            event.event_type,
            None,
            event.actor,
            event.payload.clone(),
            now(),
        ))
    }

    async fn list_events(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        since: Option<i64>,
    ) -> CoreResult<Vec<NodeEvent>> {
        let st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Ok(Vec::new());
        }
        let since = since.unwrap_or(0);
        let mut events: Vec<NodeEvent> = st
            .events
            .iter()
            .filter(|e| e.instance_id == instance_id && e.seq > since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }

    async fn list_outcomes(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<NodeOutcome>> {
        let st = self.state.lock().await;
        if !st.owns_instance(tenant_id, instance_id) {
            return Ok(Vec::new());
        }
        Ok(st
            .outcomes
            .iter()
            .filter(|o| o.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn journey_states(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        Ok(self
            .state
            .lock()
            .await
            .journey
            .range((tenant_id, user_id, String::new())..)
            .take_while(|((t, u, _), _)| *t == tenant_id && *u == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn upsert_journey_state(&self, tenant_id: DbId, row: &JourneyStateRow) -> CoreResult<()> {
        self.state.lock().await.set_projection(tenant_id, row.clone());
        Ok(())
    }

    async fn done_states(&self, tenant_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        Ok(self
            .state
            .lock()
            .await
            .journey
            .iter()
            .filter(|((t, _, _), row)| *t == tenant_id && row.state == NodeState::Done)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn reset_journey(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<u64> {
        let mut st = self.state.lock().await;
        let doomed: HashSet<DbId> = st
            .instances
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.user_id == user_id)
            .map(|i| i.id)
            .collect();
        st.instances.retain(|i| !doomed.contains(&i.id));
        st.revisions.retain(|r| !doomed.contains(&r.instance_id));
        st.uploads.retain(|u| !doomed.contains(&u.instance_id));
        st.events.retain(|e| !doomed.contains(&e.instance_id));
        st.outcomes.retain(|o| !doomed.contains(&o.instance_id));
        st.journey.retain(|(t, u, _), _| !(*t == tenant_id && *u == user_id));
        Ok(doomed.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Curriculum
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl CurriculumStore for MemoryStore {
    async fn create_program(&self, tenant_id: DbId, input: &NewProgram) -> CoreResult<Program> {
        let mut st = self.state.lock().await;
        if st
            .programs
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.code == input.code)
        {
            return Err(CoreError::conflict(format!("Program code '{}' exists", input.code)));
        }
        let program = Program {
            id: new_id(),
            tenant_id,
            code: input.code.clone(),
            title: input.title.clone(),
            active_version_id: None,
            active_playbook_version_id: None,
            created_at: now(),
        };
        st.programs.push(program.clone());
        Ok(program)
    }

    async fn program(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Program>> {
        Ok(self
            .state
            .lock()
            .await
            .programs
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.id == id)
            .cloned())
    }

    async fn list_programs(&self, tenant_id: DbId) -> CoreResult<Vec<Program>> {
        let mut programs: Vec<Program> = self
            .state
            .lock()
            .await
            .programs
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        programs.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(programs)
    }

    async fn create_course(&self, tenant_id: DbId, input: &NewCourse) -> CoreResult<Course> {
        let mut st = self.state.lock().await;
        if let Some(program_id) = input.program_id {
            if !st.programs.iter().any(|p| p.tenant_id == tenant_id && p.id == program_id) {
                return Err(CoreError::not_found("program", program_id));
            }
        }
        if st
            .courses
            .iter()
            .any(|c| c.tenant_id == tenant_id && c.code == input.code)
        {
            return Err(CoreError::conflict(format!("Course code '{}' exists", input.code)));
        }
        let course = Course {
            id: new_id(),
            tenant_id,
            program_id: input.program_id,
            code: input.code.clone(),
            title: input.title.clone(),
            credits: input.credits,
            created_at: now(),
        };
        st.courses.push(course.clone());
        Ok(course)
    }

    async fn course(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Course>> {
        Ok(self
            .state
            .lock()
            .await
            .courses
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .cloned())
    }

    async fn list_courses(&self, tenant_id: DbId) -> CoreResult<Vec<Course>> {
        let mut courses: Vec<Course> = self
            .state
            .lock()
            .await
            .courses
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    async fn draft_version(&self, tenant_id: DbId, program_id: DbId) -> CoreResult<Option<ProgramVersion>> {
        Ok(self
            .state
            .lock()
            .await
            .versions
            .iter()
            .find(|v| {
                v.tenant_id == tenant_id
                    && v.program_id == program_id
                    && v.status == VersionStatus::Draft
            })
            .cloned())
    }

    async fn latest_published_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
    ) -> CoreResult<Option<ProgramVersion>> {
        Ok(self
            .state
            .lock()
            .await
            .versions
            .iter()
            .filter(|v| {
                v.tenant_id == tenant_id
                    && v.program_id == program_id
                    && v.status == VersionStatus::Published
            })
            .max_by_key(|v| v.number)
            .cloned())
    }

    async fn create_draft(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        copy_from: Option<DbId>,
    ) -> CoreResult<ProgramVersion> {
        let mut st = self.state.lock().await;
        if !st.programs.iter().any(|p| p.tenant_id == tenant_id && p.id == program_id) {
            return Err(CoreError::not_found("program", program_id));
        }
        let mine = |v: &&ProgramVersion| v.tenant_id == tenant_id && v.program_id == program_id;
        if st
            .versions
            .iter()
            .filter(mine)
            .any(|v| v.status == VersionStatus::Draft)
        {
            return Err(CoreError::conflict("Program already has a draft version"));
        }
        let number = st.versions.iter().filter(mine).map(|v| v.number).max().unwrap_or(0) + 1;

        let at = now();
        let draft = ProgramVersion {
            id: new_id(),
            tenant_id,
            program_id,
            number,
            status: VersionStatus::Draft,
            playbook_version_id: None,
            created_at: at,
            published_at: None,
        };
        if let Some(source) = copy_from {
            let copies: Vec<BuilderNode> = st
                .builder_nodes
                .iter()
                .filter(|n| n.tenant_id == tenant_id && n.program_version_id == source)
                .map(|n| BuilderNode {
                    id: new_id(),
                    program_version_id: draft.id,
                    created_at: at,
                    updated_at: at,
                    ..n.clone()
                })
                .collect();
            st.builder_nodes.extend(copies);
        }
        st.versions.push(draft.clone());
        Ok(draft)
    }

    async fn list_builder_nodes(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<Vec<BuilderNode>> {
        let mut nodes: Vec<BuilderNode> = self
            .state
            .lock()
            .await
            .builder_nodes
            .iter()
            .filter(|n| n.tenant_id == tenant_id && n.program_version_id == version_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(nodes)
    }

    async fn insert_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        input: &NodeInput,
    ) -> CoreResult<BuilderNode> {
        let mut st = self.state.lock().await;
        if st.version(tenant_id, version_id).is_none() {
            return Err(CoreError::not_found("program_version", version_id));
        }
        if st.builder_nodes.iter().any(|n| {
            n.tenant_id == tenant_id && n.program_version_id == version_id && n.node_id == input.node_id
        }) {
            return Err(CoreError::conflict(format!("Node '{}' already exists", input.node_id)));
        }
        let at = now();
        let node = BuilderNode {
            id: new_id(),
            tenant_id,
            program_version_id: version_id,
            node_id: input.node_id.clone(),
            node_type: input.node_type,
            title: input.title.clone(),
            world_key: input.world_key.clone(),
            prerequisites: input.prerequisites.clone(),
            requirements: input.requirements.clone(),
            config: input.config.clone(),
            created_at: at,
            updated_at: at,
        };
        st.builder_nodes.push(node.clone());
        Ok(node)
    }

    async fn update_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
        input: &NodeInput,
    ) -> CoreResult<Option<BuilderNode>> {
        let mut st = self.state.lock().await;
        let Some(node) = st.builder_nodes.iter_mut().find(|n| {
            n.tenant_id == tenant_id && n.program_version_id == version_id && n.node_id == node_id
        }) else {
            return Ok(None);
        };
        node.node_type = input.node_type;
        node.title = input.title.clone();
        node.world_key = input.world_key.clone();
        node.prerequisites = input.prerequisites.clone();
        node.requirements = input.requirements.clone();
        node.config = input.config.clone();
        node.updated_at = now();
        Ok(Some(node.clone()))
    }

    async fn delete_builder_node(&self, tenant_id: DbId, version_id: DbId, node_id: &str) -> CoreResult<bool> {
        let mut st = self.state.lock().await;
        let before = st.builder_nodes.len();
        st.builder_nodes.retain(|n| {
            !(n.tenant_id == tenant_id && n.program_version_id == version_id && n.node_id == node_id)
        });
        Ok(st.builder_nodes.len() != before)
    }

    async fn set_prerequisites(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        prerequisites: &BTreeMap<String, Vec<String>>,
    ) -> CoreResult<()> {
        let mut st = self.state.lock().await;
        let at = now();
        for node in st
            .builder_nodes
            .iter_mut()
            .filter(|n| n.tenant_id == tenant_id && n.program_version_id == version_id)
        {
            node.prerequisites = prerequisites.get(&node.node_id).cloned().unwrap_or_default();
            node.updated_at = at;
        }
        Ok(())
    }

    async fn publish_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        version_id: DbId,
        playbook: &NewPlaybookVersion,
    ) -> CoreResult<(ProgramVersion, PlaybookVersion)> {
        let mut st = self.state.lock().await;
        let at = now();
        match st.version(tenant_id, version_id) {
            Some(v) if v.program_id == program_id && v.status == VersionStatus::Draft => {}
            Some(_) => return Err(CoreError::conflict("Program version is not a draft")),
            None => return Err(CoreError::not_found("program_version", version_id)),
        }
        let playbook_version = PlaybookVersion {
            id: new_id(),
            tenant_id,
            version: playbook.version.clone(),
            checksum: playbook.checksum.clone(),
            raw_json: playbook.raw_json.clone(),
            created_at: at,
        };
        st.playbook_versions.push(playbook_version.clone());

        let mut published = None;
        if let Some(v) = st
            .versions
            .iter_mut()
            .find(|v| v.tenant_id == tenant_id && v.id == version_id)
        {
            v.status = VersionStatus::Published;
            v.playbook_version_id = Some(playbook_version.id);
            v.published_at = Some(at);
            published = Some(v.clone());
        }
        if let Some(p) = st
            .programs
            .iter_mut()
            .find(|p| p.tenant_id == tenant_id && p.id == program_id)
        {
            p.active_version_id = Some(version_id);
            p.active_playbook_version_id = Some(playbook_version.id);
        }
        let published = published.ok_or_else(|| CoreError::not_found("program_version", version_id))?;
        Ok((published, playbook_version))
    }

    async fn append_audit(&self, tenant_id: DbId, entry: &NewAuditEntry) -> CoreResult<AuditEntry> {
        let mut st = self.state.lock().await;
        let at = now();
        let prev = st
            .audit
            .iter()
            .rev()
            .find(|e| e.tenant_id == tenant_id)
            .map(|e| e.integrity_hash.clone());
        let row = AuditEntry {
            id: new_id(),
            tenant_id,
            actor_id: entry.actor_id,
            action: entry.action.to_string(),
            entity: entry.entity.to_string(),
            entity_id: entry.entity_id,
            details: entry.details.clone(),
            integrity_hash: compute_integrity_hash(prev.as_deref(), &entry.canonical(at)),
            at,
        };
        st.audit.push(row.clone());
        Ok(row)
    }

    async fn list_audit(&self, tenant_id: DbId, limit: i64) -> CoreResult<Vec<AuditEntry>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .state
            .lock()
            .await
            .audit
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl SchedulerStore for MemoryStore {
    async fn create_term(&self, tenant_id: DbId, input: &NewTerm) -> CoreResult<AcademicTerm> {
        let mut st = self.state.lock().await;
        if st.terms.iter().any(|t| t.tenant_id == tenant_id && t.code == input.code) {
            return Err(CoreError::conflict(format!("Term code '{}' exists", input.code)));
        }
        let term = AcademicTerm {
            id: new_id(),
            tenant_id,
            name: input.name.clone(),
            code: input.code.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            is_closed: input.is_closed,
            created_at: now(),
        };
        st.terms.push(term.clone());
        Ok(term)
    }

    async fn term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>> {
        Ok(self
            .state
            .lock()
            .await
            .terms
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.id == id)
            .cloned())
    }

    async fn list_terms(&self, tenant_id: DbId) -> CoreResult<Vec<AcademicTerm>> {
        let mut terms: Vec<AcademicTerm> = self
            .state
            .lock()
            .await
            .terms
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        terms.sort_by_key(|t| (t.start_date, t.id));
        Ok(terms)
    }

    async fn close_term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>> {
        let mut st = self.state.lock().await;
        Ok(st
            .terms
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id && t.id == id)
            .map(|t| {
                t.is_closed = true;
                t.clone()
            }))
    }

    async fn create_room(&self, tenant_id: DbId, input: &NewRoom) -> CoreResult<Room> {
        let room = Room {
            id: new_id(),
            tenant_id,
            name: input.name.clone(),
            capacity: input.capacity,
            building: input.building.clone(),
            active: true,
        };
        self.state.lock().await.rooms.push(room.clone());
        Ok(room)
    }

    async fn room(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Room>> {
        Ok(self
            .state
            .lock()
            .await
            .rooms
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.id == id)
            .cloned())
    }

    async fn list_rooms(&self, tenant_id: DbId) -> CoreResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .state
            .lock()
            .await
            .rooms
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }

    async fn create_cohort(&self, tenant_id: DbId, name: &str) -> CoreResult<Cohort> {
        let cohort = Cohort {
            id: new_id(),
            tenant_id,
            name: name.to_string(),
        };
        self.state.lock().await.cohorts.push(cohort.clone());
        Ok(cohort)
    }

    async fn list_cohorts(&self, tenant_id: DbId) -> CoreResult<Vec<Cohort>> {
        Ok(self
            .state
            .lock()
            .await
            .cohorts
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create_offering(&self, tenant_id: DbId, input: &NewOffering) -> CoreResult<CourseOffering> {
        let mut st = self.state.lock().await;
        if !st.terms.iter().any(|t| t.tenant_id == tenant_id && t.id == input.term_id) {
            return Err(CoreError::not_found("term", input.term_id));
        }
        if !st.courses.iter().any(|c| c.tenant_id == tenant_id && c.id == input.course_id) {
            return Err(CoreError::not_found("course", input.course_id));
        }
        if let Some(room_id) = input.preferred_room_id {
            if !st.rooms.iter().any(|r| r.tenant_id == tenant_id && r.id == room_id) {
                return Err(CoreError::not_found("room", room_id));
            }
        }
        let offering = CourseOffering {
            id: new_id(),
            tenant_id,
            term_id: input.term_id,
            course_id: input.course_id,
            section: input.section.clone(),
            delivery_format: input.delivery_format(),
            capacity: input.capacity,
            weekly_sessions: input.weekly_sessions(),
            preferred_room_id: input.preferred_room_id,
            created_at: now(),
        };
        st.offerings.push(offering.clone());
        Ok(offering)
    }

    async fn offering(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<CourseOffering>> {
        Ok(self.state.lock().await.offering(tenant_id, id).cloned())
    }

    async fn list_offerings(&self, tenant_id: DbId, term_id: Option<DbId>) -> CoreResult<Vec<CourseOffering>> {
        let mut offerings: Vec<CourseOffering> = self
            .state
            .lock()
            .await
            .offerings
            .iter()
            .filter(|o| o.tenant_id == tenant_id && term_id.map_or(true, |t| o.term_id == t))
            .cloned()
            .collect();
        offerings.sort_by_key(|o| o.id);
        Ok(offerings)
    }

    async fn upsert_staff(&self, tenant_id: DbId, staff: &CourseStaff) -> CoreResult<CourseStaff> {
        let mut st = self.state.lock().await;
        if st.offering(tenant_id, staff.offering_id).is_none() {
            return Err(CoreError::not_found("offering", staff.offering_id));
        }
        st.staff.retain(|(t, s)| {
            !(*t == tenant_id && s.offering_id == staff.offering_id && s.user_id == staff.user_id)
        });
        st.staff.push((tenant_id, staff.clone()));
        Ok(staff.clone())
    }

    async fn link_cohort(&self, tenant_id: DbId, offering_id: DbId, cohort_id: DbId) -> CoreResult<()> {
        let mut st = self.state.lock().await;
        if st.offering(tenant_id, offering_id).is_none() {
            return Err(CoreError::not_found("offering", offering_id));
        }
        if !st.cohorts.iter().any(|c| c.tenant_id == tenant_id && c.id == cohort_id) {
            return Err(CoreError::not_found("cohort", cohort_id));
        }
        let link = (tenant_id, offering_id, cohort_id);
        if !st.offering_cohorts.contains(&link) {
            st.offering_cohorts.push(link);
        }
        Ok(())
    }

    async fn add_availability(&self, tenant_id: DbId, input: &NewAvailability) -> CoreResult<AvailabilityWindow> {
        let window = AvailabilityWindow {
            id: new_id(),
            tenant_id,
            user_id: input.user_id,
            weekday: input.weekday,
            start_time: input.start_time,
            end_time: input.end_time,
            is_unavailable: input.is_unavailable,
        };
        self.state.lock().await.availability.push(window.clone());
        Ok(window)
    }

    async fn list_availability(&self, tenant_id: DbId) -> CoreResult<Vec<AvailabilityWindow>> {
        Ok(self
            .state
            .lock()
            .await
            .availability
            .iter()
            .filter(|w| w.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn offering_profile(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Option<OfferingProfile>> {
        Ok(self.state.lock().await.profile(tenant_id, offering_id))
    }

    async fn offering_profiles(&self, tenant_id: DbId, term_id: DbId) -> CoreResult<Vec<OfferingProfile>> {
        let st = self.state.lock().await;
        let mut ids: Vec<DbId> = st
            .offerings
            .iter()
            .filter(|o| o.tenant_id == tenant_id && o.term_id == term_id)
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        Ok(ids.into_iter().filter_map(|id| st.profile(tenant_id, id)).collect())
    }

    async fn list_sessions(&self, tenant_id: DbId, filter: &SessionFilter) -> CoreResult<Vec<ClassSession>> {
        let mut sessions: Vec<ClassSession> = self
            .state
            .lock()
            .await
            .sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id && filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.date, s.start_time, s.id));
        Ok(sessions)
    }

    async fn scheduled_sessions(
        &self,
        tenant_id: DbId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<ScheduledSession>> {
        Ok(self.state.lock().await.scheduled(tenant_id, start, end))
    }

    async fn insert_sessions_checked(
        &self,
        tenant_id: DbId,
        proposals: &[NewSession],
        check: &SessionCheck<'_>,
    ) -> CoreResult<BatchOutcome> {
        let mut st = self.state.lock().await;
        let mut accepted: Vec<(NewSession, ScheduledSession)> = Vec::with_capacity(proposals.len());
        let mut reports = Vec::with_capacity(proposals.len());

        for (index, proposal) in proposals.iter().enumerate() {
            let profile = st
                .profile(tenant_id, proposal.offering_id)
                .ok_or_else(|| CoreError::not_found("offering", proposal.offering_id))?;
            let mut existing = st.scheduled(tenant_id, proposal.date, proposal.date);
            existing.extend(
                accepted
                    .iter()
                    .filter(|(p, _)| p.date == proposal.date)
                    .map(|(_, s)| s.clone()),
            );
            let report = check(proposal, &existing);
            if !report.is_clear() {
                return Ok(BatchOutcome::Rejected { index, report });
            }
            accepted.push((proposal.clone(), ScheduledSession::tentative(proposal, &profile)));
            reports.push(report);
        }

        let at = now();
        let mut inserted = Vec::with_capacity(accepted.len());
        for ((proposal, _), report) in accepted.into_iter().zip(reports) {
            let session = ClassSession {
                id: new_id(),
                tenant_id,
                offering_id: proposal.offering_id,
                date: proposal.date,
                start_time: proposal.start_time,
                end_time: proposal.end_time,
                room_id: proposal.room_id,
                session_type: proposal.session_type,
                created_at: at,
            };
            st.sessions.push(session.clone());
            inserted.push((session, report));
        }
        Ok(BatchOutcome::Inserted(inserted))
    }

    async fn delete_session(&self, tenant_id: DbId, id: DbId) -> CoreResult<bool> {
        let mut st = self.state.lock().await;
        let before = st.sessions.len();
        st.sessions.retain(|s| !(s.tenant_id == tenant_id && s.id == id));
        Ok(st.sessions.len() != before)
    }
}

// ---------------------------------------------------------------------------
// Gradebook
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl GradebookStore for MemoryStore {
    async fn enroll(&self, tenant_id: DbId, offering_id: DbId, student_id: DbId) -> CoreResult<Enrollment> {
        let mut st = self.state.lock().await;
        if st.offering(tenant_id, offering_id).is_none() {
            return Err(CoreError::not_found("offering", offering_id));
        }
        if let Some(existing) = st.enrollments.iter_mut().find(|e| {
            e.tenant_id == tenant_id && e.offering_id == offering_id && e.student_id == student_id
        }) {
            existing.status = EnrollmentStatus::Active;
            return Ok(existing.clone());
        }
        let enrollment = Enrollment {
            tenant_id,
            offering_id,
            student_id,
            status: EnrollmentStatus::Active,
            enrolled_at: now(),
        };
        st.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn list_enrollments(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<Enrollment>> {
        Ok(self
            .state
            .lock()
            .await
            .enrollments
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.offering_id == offering_id)
            .cloned()
            .collect())
    }

    async fn create_activity(
        &self,
        tenant_id: DbId,
        offering_id: DbId,
        input: &NewActivity,
    ) -> CoreResult<Activity> {
        let mut st = self.state.lock().await;
        if st.offering(tenant_id, offering_id).is_none() {
            return Err(CoreError::not_found("offering", offering_id));
        }
        let activity = Activity {
            id: new_id(),
            tenant_id,
            offering_id,
            title: input.title.clone(),
            max_score: input.max_score,
            weight: input.weight,
            created_at: now(),
        };
        st.activities.push(activity.clone());
        Ok(activity)
    }

    async fn activity(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Activity>> {
        Ok(self
            .state
            .lock()
            .await
            .activities
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.id == id)
            .cloned())
    }

    async fn upsert_grade(&self, tenant_id: DbId, input: &NewGrade) -> CoreResult<GradebookEntry> {
        let mut st = self.state.lock().await;
        let at = now();
        if let Some(existing) = st.grades.iter_mut().find(|g| {
            g.tenant_id == tenant_id
                && g.activity_id == input.activity_id
                && g.student_id == input.student_id
        }) {
            existing.score = input.score;
            existing.max_score = input.max_score;
            existing.grade = input.grade.clone();
            existing.graded_by = input.graded_by;
            existing.graded_at = at;
            return Ok(existing.clone());
        }
        let entry = GradebookEntry {
            id: new_id(),
            tenant_id,
            offering_id: input.offering_id,
            activity_id: input.activity_id,
            student_id: input.student_id,
            score: input.score,
            max_score: input.max_score,
            grade: input.grade.clone(),
            graded_by: input.graded_by,
            graded_at: at,
        };
        st.grades.push(entry.clone());
        Ok(entry)
    }

    async fn list_gradebook(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<GradebookEntry>> {
        let mut entries: Vec<GradebookEntry> = self
            .state
            .lock()
            .await
            .grades
            .iter()
            .filter(|g| g.tenant_id == tenant_id && g.offering_id == offering_id)
            .cloned()
            .collect();
        entries.sort_by_key(|g| (g.student_id, g.activity_id));
        Ok(entries)
    }

    async fn student_grade_records(&self, tenant_id: DbId, student_id: DbId) -> CoreResult<Vec<GradeRecord>> {
        let st = self.state.lock().await;
        let mut records = Vec::new();
        for g in st
            .grades
            .iter()
            .filter(|g| g.tenant_id == tenant_id && g.student_id == student_id)
        {
            let Some(offering) = st.offering(tenant_id, g.offering_id) else {
                continue;
            };
            let credits = st
                .courses
                .iter()
                .find(|c| c.tenant_id == tenant_id && c.id == offering.course_id)
                .map_or(0, |c| c.credits);
            let term_closed = st
                .terms
                .iter()
                .find(|t| t.tenant_id == tenant_id && t.id == offering.term_id)
                .is_some_and(|t| t.is_closed);
            records.push(GradeRecord {
                offering_id: g.offering_id,
                credits,
                term_closed,
                score: g.score,
                max_score: g.max_score,
            });
        }
        Ok(records)
    }

    async fn grading_schema(&self, tenant_id: DbId) -> CoreResult<Option<GradingSchema>> {
        Ok(self.state.lock().await.schemas.get(&tenant_id).cloned())
    }

    async fn set_grading_schema(&self, schema: &GradingSchema) -> CoreResult<()> {
        self.state
            .lock()
            .await
            .schemas
            .insert(schema.tenant_id, schema.clone());
        Ok(())
    }
}
