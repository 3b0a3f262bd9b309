//! The journey engine: resolves a user's playbook version, materializes node
//! instances and drives every transition through the rule table.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::audit::{action_types, entities, NewAuditEntry};
use crate::capabilities::{can, Action, Resource};
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::journey::model::{
    Decision, EventType, FormData, InstanceKey, JourneyStateRow, NewNodeEvent, NodeEvent,
    NodeInstance, NodeOutcome, StateChange,
};
use crate::journey::state::{rule_for, rules_from, Gate, NodeState, Precondition, TransitionRule};
use crate::journey::{JourneyObserver, NoopObserver, TransitionNotice};
use crate::localized::Localized;
use crate::playbook::{Catalogue, CatalogueCache, NewPlaybookVersion, NodeDefinition, NodeType, PlaybookVersion};
use crate::store::Store;
use crate::types::{now, DbId, Timestamp};

/// Maximum length of a comment or reviewer note.
pub const MAX_NOTE_CHARS: usize = 4000;

/// Attempts at committing one transition before giving up with `Conflict`.
const COMMIT_ATTEMPTS: usize = 2;

/// Scoreboard XP for each completed node in a scored world.
pub const XP_PER_NODE: u32 = 100;

/// Entries shown at the top of the scoreboard.
pub const SCOREBOARD_TOP: usize = 5;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FormView {
    pub rev: i32,
    pub data: FormData,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub key: String,
    pub required: bool,
    pub label: Localized,
    pub mime: Vec<String>,
    pub document_id: Option<DbId>,
    pub uploaded_at: Option<Timestamp>,
}

/// What `GET /nodes/{nodeId}/submission` returns.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionView {
    pub instance_id: DbId,
    pub node_id: String,
    pub node_type: NodeType,
    pub title: Localized,
    pub world: String,
    pub playbook_version_id: DbId,
    pub state: NodeState,
    pub current_rev: i32,
    pub form: Option<FormView>,
    pub slots: Vec<SlotView>,
    pub allowed_transitions: Vec<NodeState>,
    pub outcomes: Vec<NodeOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldProgress {
    pub world: String,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyProgress {
    pub playbook_version_id: DbId,
    pub worlds: Vec<WorldProgress>,
    pub done: usize,
    pub total: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreboardEntry {
    pub user_id: DbId,
    pub name: String,
    pub total_score: u32,
    /// 1-based position. Users without XP rank after every listed entry.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub top: Vec<ScoreboardEntry>,
    /// Mean XP over users with any XP, rounded down.
    pub average: u32,
    pub me: ScoreboardEntry,
    pub total_users: usize,
}

/// Replay an instance's events into the state they imply.
pub fn fold_events(events: &[NodeEvent]) -> Option<NodeState> {
    events.iter().fold(None, |state, e| match e.event_type {
        EventType::Created => Some(NodeState::Active),
        EventType::StateChanged => e.to_state.or(state),
        _ => state,
    })
}

fn check_gate(ctx: &RequestContext, gate: Gate, owner: DbId) -> CoreResult<()> {
    match gate {
        Gate::Owner => can(ctx, Action::EditOwnSubmission, Resource::OwnedBy(owner)),
        Gate::Reviewer => can(ctx, Action::ReviewSubmission, Resource::Tenant),
        Gate::Admin => can(ctx, Action::OverrideJourney, Resource::Tenant),
        Gate::System => can(ctx, Action::ExternalCheck, Resource::Tenant),
    }
}

fn check_view(ctx: &RequestContext, user_id: DbId) -> CoreResult<()> {
    if ctx.user_id == user_id {
        can(ctx, Action::ViewOwnJourney, Resource::OwnedBy(user_id))
    } else {
        can(ctx, Action::ViewStudentJourney, Resource::OwnedBy(user_id))
    }
}

fn clean_note(note: Option<&str>) -> CoreResult<Option<String>> {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if n.chars().count() > MAX_NOTE_CHARS => Err(CoreError::BadInput(format!(
            "Note exceeds {MAX_NOTE_CHARS} characters"
        ))),
        Some(n) => Ok(Some(n.to_string())),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct JourneyEngine<S: ?Sized> {
    store: Arc<S>,
    catalogues: Arc<CatalogueCache>,
    observer: Arc<dyn JourneyObserver>,
}

impl<S: Store + ?Sized> JourneyEngine<S> {
    pub fn new(store: Arc<S>, catalogues: Arc<CatalogueCache>) -> Self {
        Self {
            store,
            catalogues,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JourneyObserver>) -> Self {
        self.observer = observer;
        self
    }

    // -- Playbook resolution ------------------------------------------------

    /// Version a user's journey runs on: the version their instances are
    /// pinned to, else their program's active playbook, else the tenant's.
    async fn resolve_version(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<DbId> {
        if let Some(v) = self.store.pinned_version(tenant_id, user_id).await? {
            return Ok(v);
        }
        let program_id = self.store.user(user_id).await?.and_then(|u| u.program_id);
        if let Some(program_id) = program_id {
            let active = self
                .store
                .program(tenant_id, program_id)
                .await?
                .and_then(|p| p.active_playbook_version_id);
            if let Some(v) = active {
                return Ok(v);
            }
        }
        self.store
            .active_playbook_version(tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("playbook_version", "active"))
    }

    pub async fn catalogue_for(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<Arc<Catalogue>> {
        ctx.checkpoint()?;
        let tenant_id = ctx.tenant_id;
        let version_id = self.resolve_version(tenant_id, user_id).await?;
        self.catalogues
            .get_or_load(tenant_id, version_id, || {
                self.store.playbook_version(tenant_id, version_id)
            })
            .await
    }

    /// Validate and persist a raw playbook, optionally making it the tenant
    /// default for users without a program.
    pub async fn install_playbook(
        &self,
        ctx: &RequestContext,
        raw_json: String,
        activate: bool,
    ) -> CoreResult<PlaybookVersion> {
        can(ctx, Action::PublishCurriculum, Resource::Tenant)?;
        let input = NewPlaybookVersion::from_raw(raw_json)?;
        ctx.checkpoint()?;
        let version = self.store.insert_playbook_version(ctx.tenant_id, &input).await?;
        if activate {
            self.store
                .activate_playbook_version(ctx.tenant_id, version.id)
                .await?;
        }
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            version_id = %version.id,
            version = %version.version,
            activate,
            "Playbook version installed",
        );
        Ok(version)
    }

    // -- Instances ----------------------------------------------------------

    fn key(ctx: &RequestContext, catalogue: &Catalogue, user_id: DbId, node_id: &str) -> InstanceKey {
        InstanceKey {
            tenant_id: ctx.tenant_id,
            user_id,
            node_id: node_id.to_string(),
            playbook_version_id: catalogue.version_id(),
        }
    }

    /// The owner materializes on first access; anyone else needs an
    /// existing instance.
    async fn instance_for(
        &self,
        ctx: &RequestContext,
        catalogue: &Catalogue,
        user_id: DbId,
        node_id: &str,
    ) -> CoreResult<NodeInstance> {
        let key = Self::key(ctx, catalogue, user_id, node_id);
        ctx.checkpoint()?;
        if ctx.user_id == user_id {
            let (instance, created) = self.store.get_or_create_instance(&key, ctx.user_id).await?;
            if created {
                tracing::info!(
                    tenant_id = %ctx.tenant_id,
                    user_id = %user_id,
                    node_id = %node_id,
                    instance_id = %instance.id,
                    "Node instance created",
                );
            }
            Ok(instance)
        } else {
            self.store
                .find_instance(&key)
                .await?
                .ok_or_else(|| CoreError::not_found("node_instance", node_id))
        }
    }

    fn allowed_transitions(ctx: &RequestContext, instance: &NodeInstance) -> Vec<NodeState> {
        rules_from(instance.state)
            .into_iter()
            .filter(|r| check_gate(ctx, r.gate, instance.user_id).is_ok())
            .map(|r| r.to)
            .collect()
    }

    async fn view(
        &self,
        ctx: &RequestContext,
        catalogue: &Catalogue,
        node: &NodeDefinition,
        instance: NodeInstance,
    ) -> CoreResult<SubmissionView> {
        ctx.checkpoint()?;
        let form = if instance.current_rev > 0 {
            self.store
                .form_revision(ctx.tenant_id, instance.id, instance.current_rev)
                .await?
                .map(|r| FormView {
                    rev: r.rev,
                    data: r.form_data,
                })
        } else {
            None
        };
        let uploads = self.store.list_uploads(ctx.tenant_id, instance.id).await?;
        let slots = node
            .requirements
            .uploads
            .iter()
            .map(|slot| {
                let fulfilled = uploads.iter().find(|u| u.slot_key == slot.key);
                SlotView {
                    key: slot.key.clone(),
                    required: slot.required,
                    label: slot.label.clone(),
                    mime: slot.mime.clone(),
                    document_id: fulfilled.map(|u| u.document_id),
                    uploaded_at: fulfilled.map(|u| u.uploaded_at),
                }
            })
            .collect();
        let outcomes = self.store.list_outcomes(ctx.tenant_id, instance.id).await?;

        Ok(SubmissionView {
            instance_id: instance.id,
            node_id: node.id.clone(),
            node_type: node.node_type,
            title: node.title.clone(),
            world: catalogue.world(&node.id).unwrap_or_default().to_string(),
            playbook_version_id: instance.playbook_version_id,
            state: instance.state,
            current_rev: instance.current_rev,
            form,
            slots,
            allowed_transitions: Self::allowed_transitions(ctx, &instance),
            outcomes,
        })
    }

    /// Open a node of `user_id`'s journey, creating the instance when the
    /// owner opens it for the first time.
    pub async fn open_node(&self, ctx: &RequestContext, user_id: DbId, node_id: &str) -> CoreResult<SubmissionView> {
        check_view(ctx, user_id)?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        let node = catalogue.require(node_id)?;
        let instance = self.instance_for(ctx, &catalogue, user_id, node_id).await?;
        self.view(ctx, &catalogue, node, instance).await
    }

    /// Append a form revision to the caller's own node.
    pub async fn save_form(&self, ctx: &RequestContext, node_id: &str, form_data: &FormData) -> CoreResult<NodeInstance> {
        can(ctx, Action::EditOwnSubmission, Resource::OwnedBy(ctx.user_id))?;
        let catalogue = self.catalogue_for(ctx, ctx.user_id).await?;
        catalogue.require(node_id)?;
        let instance = self.instance_for(ctx, &catalogue, ctx.user_id, node_id).await?;
        ctx.checkpoint()?;
        let updated = self
            .store
            .append_form_revision(ctx.tenant_id, instance.id, form_data, ctx.user_id)
            .await?;
        tracing::debug!(
            tenant_id = %ctx.tenant_id,
            instance_id = %updated.id,
            rev = updated.current_rev,
            "Form revision saved",
        );
        Ok(updated)
    }

    /// `PUT /nodes/{nodeId}/submission`: save a revision, then attempt the
    /// optional state hint.
    pub async fn put_submission(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        form_data: &FormData,
        state: Option<NodeState>,
    ) -> CoreResult<SubmissionView> {
        let saved = self.save_form(ctx, node_id, form_data).await?;
        if let Some(to) = state.filter(|to| *to != saved.state) {
            self.transition(ctx, ctx.user_id, node_id, to, None).await?;
        }
        self.open_node(ctx, ctx.user_id, node_id).await
    }

    /// Fulfil an upload slot declared by the node.
    pub async fn attach_upload(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        slot_key: &str,
        document_id: DbId,
    ) -> CoreResult<SubmissionView> {
        can(ctx, Action::EditOwnSubmission, Resource::OwnedBy(ctx.user_id))?;
        let catalogue = self.catalogue_for(ctx, ctx.user_id).await?;
        let node = catalogue.require(node_id)?;
        if node.upload_slot(slot_key).is_none() {
            return Err(CoreError::BadInput(format!(
                "Node '{node_id}' declares no upload slot '{slot_key}'"
            )));
        }
        let instance = self.instance_for(ctx, &catalogue, ctx.user_id, node_id).await?;
        ctx.checkpoint()?;
        self.store
            .attach_upload(ctx.tenant_id, instance.id, slot_key, document_id, ctx.user_id)
            .await?;
        let instance = self
            .store
            .instance(ctx.tenant_id, instance.id)
            .await?
            .ok_or_else(|| CoreError::not_found("node_instance", instance.id))?;
        self.view(ctx, &catalogue, node, instance).await
    }

    pub async fn add_comment(
        &self,
        ctx: &RequestContext,
        user_id: DbId,
        node_id: &str,
        text: &str,
    ) -> CoreResult<NodeEvent> {
        check_view(ctx, user_id)?;
        let text = clean_note(Some(text))?
            .ok_or_else(|| CoreError::BadInput("Comment text must not be empty".into()))?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        catalogue.require(node_id)?;
        let instance = self.instance_for(ctx, &catalogue, user_id, node_id).await?;
        ctx.checkpoint()?;
        self.store
            .append_event(
                ctx.tenant_id,
                instance.id,
                &NewNodeEvent {
                    event_type: EventType::CommentAdded,
                    actor: ctx.user_id,
                    payload: serde_json::json!({ "text": text }),
                },
            )
            .await
    }

    pub async fn events(
        &self,
        ctx: &RequestContext,
        user_id: DbId,
        node_id: &str,
        since: Option<i64>,
    ) -> CoreResult<Vec<NodeEvent>> {
        check_view(ctx, user_id)?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        catalogue.require(node_id)?;
        let key = Self::key(ctx, &catalogue, user_id, node_id);
        ctx.checkpoint()?;
        let instance = self
            .store
            .find_instance(&key)
            .await?
            .ok_or_else(|| CoreError::not_found("node_instance", node_id))?;
        self.store.list_events(ctx.tenant_id, instance.id, since).await
    }

    // -- Transitions --------------------------------------------------------

    /// Attempt `user_id`'s node `node_id` -> `to`.
    ///
    /// Checks, in order: the edge exists, the actor passes its gate, the
    /// prerequisite gate, the edge precondition. The commit is a CAS on
    /// the current state; a lost race is retried once against the new
    /// state.
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        user_id: DbId,
        node_id: &str,
        to: NodeState,
        note: Option<&str>,
    ) -> CoreResult<NodeInstance> {
        let note = clean_note(note)?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        let node = catalogue.require(node_id)?;
        let mut instance = self.instance_for(ctx, &catalogue, user_id, node_id).await?;

        for attempt in 0..COMMIT_ATTEMPTS {
            let from = instance.state;
            let rule = rule_for(from, to).ok_or_else(|| CoreError::IllegalTransition {
                from,
                to,
                reason: "transition not allowed".into(),
            })?;
            check_gate(ctx, rule.gate, instance.user_id)?;
            if rule.prereq_gate {
                self.check_prerequisites(ctx, &catalogue, &instance).await?;
            }
            self.check_precondition(ctx, node, &instance, &rule, note.as_deref())
                .await?;

            let change = Self::state_change(ctx, &instance, &rule, note.clone());
            ctx.checkpoint()?;
            match self.store.commit_transition(&change).await? {
                Some(updated) => {
                    tracing::info!(
                        tenant_id = %ctx.tenant_id,
                        user_id = %user_id,
                        node_id = %node_id,
                        instance_id = %updated.id,
                        from = %from,
                        to = %to,
                        actor = %ctx.user_id,
                        correlation_id = %ctx.correlation_id,
                        "Node state changed",
                    );
                    if to == NodeState::Done {
                        self.activate_successors(ctx, &catalogue, &updated).await;
                    }
                    self.observer.on_transition(&TransitionNotice {
                        tenant_id: ctx.tenant_id,
                        user_id,
                        node_id: node_id.to_string(),
                        instance_id: updated.id,
                        from,
                        to,
                        actor: ctx.user_id,
                        note,
                        correlation_id: ctx.correlation_id.clone(),
                        at: change.at,
                    });
                    return Ok(updated);
                }
                None => {
                    tracing::debug!(
                        instance_id = %instance.id,
                        attempt,
                        "Transition lost the state CAS, reloading",
                    );
                    instance = self
                        .store
                        .instance(ctx.tenant_id, instance.id)
                        .await?
                        .ok_or_else(|| CoreError::not_found("node_instance", instance.id))?;
                }
            }
        }
        Err(CoreError::conflict(format!(
            "Concurrent update on node '{node_id}', retry the request"
        )))
    }

    fn state_change(
        ctx: &RequestContext,
        instance: &NodeInstance,
        rule: &TransitionRule,
        note: Option<String>,
    ) -> StateChange {
        let mut payload = serde_json::Map::new();
        if rule.is_override {
            payload.insert("override".into(), serde_json::Value::Bool(true));
        }
        if let Some(n) = &note {
            payload.insert("note".into(), serde_json::Value::String(n.clone()));
        }
        let outcome = match (rule.from, rule.to) {
            (NodeState::Submitted, NodeState::Done) => Some((Decision::Approved, note)),
            (NodeState::Submitted, NodeState::NeedsFixes) => Some((Decision::Rejected, note)),
            _ => None,
        };
        StateChange {
            tenant_id: ctx.tenant_id,
            instance_id: instance.id,
            user_id: instance.user_id,
            node_id: instance.node_id.clone(),
            from: rule.from,
            to: rule.to,
            actor: ctx.user_id,
            payload: serde_json::Value::Object(payload),
            outcome,
            at: now(),
        }
    }

    async fn check_prerequisites(
        &self,
        ctx: &RequestContext,
        catalogue: &Catalogue,
        instance: &NodeInstance,
    ) -> CoreResult<()> {
        let prerequisites = catalogue.prerequisites(&instance.node_id);
        if prerequisites.is_empty() {
            return Ok(());
        }
        ctx.checkpoint()?;
        let states: HashMap<String, NodeState> = self
            .store
            .journey_states(ctx.tenant_id, instance.user_id)
            .await?
            .into_iter()
            .map(|r| (r.node_id, r.state))
            .collect();
        let mut blocking: Vec<String> = prerequisites
            .iter()
            .filter(|p| states.get(p.as_str()) != Some(&NodeState::Done))
            .cloned()
            .collect();
        if blocking.is_empty() {
            return Ok(());
        }
        catalogue.sort_topologically(&mut blocking);
        Err(CoreError::PrereqNotSatisfied { blocking })
    }

    async fn check_precondition(
        &self,
        ctx: &RequestContext,
        node: &NodeDefinition,
        instance: &NodeInstance,
        rule: &TransitionRule,
        note: Option<&str>,
    ) -> CoreResult<()> {
        let illegal = |reason: String| CoreError::IllegalTransition {
            from: rule.from,
            to: rule.to,
            reason,
        };
        match rule.precondition {
            Precondition::SubmissionComplete => {
                if node.node_type.requires_form() && instance.current_rev < 1 {
                    return Err(illegal("form must be saved before submitting".into()));
                }
                let mut required = node.required_slots().peekable();
                if required.peek().is_some() {
                    ctx.checkpoint()?;
                    let uploads = self.store.list_uploads(ctx.tenant_id, instance.id).await?;
                    let missing: Vec<&str> = required
                        .filter(|slot| !uploads.iter().any(|u| u.slot_key == slot.key))
                        .map(|slot| slot.key.as_str())
                        .collect();
                    if !missing.is_empty() {
                        return Err(illegal(format!(
                            "required uploads missing: {}",
                            missing.join(", ")
                        )));
                    }
                }
                Ok(())
            }
            Precondition::RevisedSinceFixes => {
                if instance.current_rev > instance.state_entered_rev {
                    Ok(())
                } else {
                    Err(illegal("a new revision is required after needs_fixes".into()))
                }
            }
            Precondition::ExternalCheckDeclared => {
                if node.requirements.external_check {
                    Ok(())
                } else {
                    Err(illegal("node declares no external check".into()))
                }
            }
            Precondition::FeedbackProvided => {
                if note.is_some() {
                    Ok(())
                } else {
                    Err(CoreError::BadInput(
                        "A note is required when requesting fixes".into(),
                    ))
                }
            }
            Precondition::None => Ok(()),
        }
    }

    /// Materialize dependents whose prerequisites are now all done. The
    /// transition is already committed, so failures are only logged.
    async fn activate_successors(&self, ctx: &RequestContext, catalogue: &Catalogue, done: &NodeInstance) {
        let dependents = catalogue.dependents(&done.node_id);
        if dependents.is_empty() {
            return;
        }
        let states: HashMap<String, NodeState> =
            match self.store.journey_states(ctx.tenant_id, done.user_id).await {
                Ok(rows) => rows.into_iter().map(|r| (r.node_id, r.state)).collect(),
                Err(e) => {
                    tracing::warn!(instance_id = %done.id, error = %e, "Successor activation skipped");
                    return;
                }
            };
        for dep in dependents {
            if states.contains_key(dep.as_str()) {
                continue;
            }
            let ready = catalogue
                .prerequisites(dep)
                .iter()
                .all(|p| states.get(p.as_str()) == Some(&NodeState::Done));
            if !ready {
                continue;
            }
            let key = Self::key(ctx, catalogue, done.user_id, dep);
            match self.store.get_or_create_instance(&key, ctx.user_id).await {
                Ok((instance, true)) => tracing::info!(
                    tenant_id = %ctx.tenant_id,
                    user_id = %done.user_id,
                    node_id = %dep,
                    instance_id = %instance.id,
                    "Successor node activated",
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(node_id = %dep, error = %e, "Successor activation failed"),
            }
        }
    }

    // -- Journey reads ------------------------------------------------------

    pub async fn journey_state(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        check_view(ctx, user_id)?;
        ctx.checkpoint()?;
        self.store.journey_states(ctx.tenant_id, user_id).await
    }

    pub async fn progress(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<JourneyProgress> {
        check_view(ctx, user_id)?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        let states: HashMap<String, NodeState> = self
            .store
            .journey_states(ctx.tenant_id, user_id)
            .await?
            .into_iter()
            .map(|r| (r.node_id, r.state))
            .collect();
        let worlds: Vec<WorldProgress> = catalogue
            .worlds()
            .iter()
            .map(|world| {
                let nodes = catalogue.nodes_in_world(world);
                WorldProgress {
                    world: world.clone(),
                    done: nodes
                        .iter()
                        .filter(|n| states.get(n.id.as_str()) == Some(&NodeState::Done))
                        .count(),
                    total: nodes.len(),
                }
            })
            .collect();
        let done = worlds.iter().map(|w| w.done).sum();
        let total = catalogue.len();
        Ok(JourneyProgress {
            playbook_version_id: catalogue.version_id(),
            worlds,
            done,
            total,
            complete: total > 0 && done == total,
        })
    }

    /// Every catalogue node is `done` for the user.
    pub async fn is_program_complete(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<bool> {
        Ok(self.progress(ctx, user_id).await?.complete)
    }

    /// Tenant-wide XP ranking of users with at least one scored `done` node.
    ///
    /// Ties keep a stable order by user id.
    pub async fn scoreboard(&self, ctx: &RequestContext) -> CoreResult<Scoreboard> {
        can(ctx, Action::ViewOwnJourney, Resource::OwnedBy(ctx.user_id))?;
        let mut done: HashMap<DbId, Vec<String>> = HashMap::new();
        for row in self.store.done_states(ctx.tenant_id).await? {
            done.entry(row.user_id).or_default().push(row.node_id);
        }

        let mut entries = Vec::with_capacity(done.len());
        for (user_id, nodes) in done {
            let catalogue = self.catalogue_for(ctx, user_id).await?;
            let scored = nodes.iter().filter(|n| catalogue.is_scored(n)).count() as u32;
            if scored == 0 {
                continue;
            }
            let name = match self.store.user(user_id).await? {
                Some(u) if !u.display_name.trim().is_empty() => u.display_name,
                Some(u) => u.username,
                None => "Unknown".to_string(),
            };
            entries.push(ScoreboardEntry {
                user_id,
                name,
                total_score: scored.saturating_mul(XP_PER_NODE),
                rank: 0,
            });
        }
        entries.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }

        let total_users = entries.len();
        let sum: u64 = entries.iter().map(|e| u64::from(e.total_score)).sum();
        let average = match total_users {
            0 => 0,
            n => u32::try_from(sum / n as u64).unwrap_or(u32::MAX),
        };
        let me = match entries.iter().find(|e| e.user_id == ctx.user_id) {
            Some(e) => e.clone(),
            None => ScoreboardEntry {
                user_id: ctx.user_id,
                name: self
                    .store
                    .user(ctx.user_id)
                    .await?
                    .map(|u| u.display_name)
                    .unwrap_or_default(),
                total_score: 0,
                rank: total_users + 1,
            },
        };
        entries.truncate(SCOREBOARD_TOP);
        Ok(Scoreboard {
            top: entries,
            average,
            me,
            total_users,
        })
    }

    /// Wipe a user's journey so it restarts from the active playbook.
    /// Returns the number of node instances removed.
    pub async fn reset(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<u64> {
        can(ctx, Action::OverrideJourney, Resource::Tenant)?;
        ctx.checkpoint()?;
        if self.store.membership(ctx.tenant_id, user_id).await?.is_none() {
            return Err(CoreError::not_found("user", user_id));
        }
        let removed = self.store.reset_journey(ctx.tenant_id, user_id).await?;
        let entry = NewAuditEntry::new(ctx.user_id, action_types::JOURNEY_RESET, entities::USER, user_id)
            .with_details(serde_json::json!({ "removed_instances": removed }));
        self.store.append_audit(ctx.tenant_id, &entry).await?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            user_id = %user_id,
            removed,
            "Journey reset",
        );
        Ok(removed)
    }

    /// Compare the projection to the fold of each instance's events and
    /// heal divergent rows. Returns the rows that were rewritten.
    pub async fn reconcile(&self, ctx: &RequestContext, user_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        can(ctx, Action::OverrideJourney, Resource::Tenant)?;
        let catalogue = self.catalogue_for(ctx, user_id).await?;
        let projection: HashMap<String, NodeState> = self
            .store
            .journey_states(ctx.tenant_id, user_id)
            .await?
            .into_iter()
            .map(|r| (r.node_id, r.state))
            .collect();

        let mut healed = Vec::new();
        for instance in self.store.list_instances(ctx.tenant_id, user_id).await? {
            if instance.playbook_version_id != catalogue.version_id() {
                continue;
            }
            ctx.checkpoint()?;
            let events = self.store.list_events(ctx.tenant_id, instance.id, None).await?;
            let Some(folded) = fold_events(&events) else {
                tracing::warn!(instance_id = %instance.id, "Instance has no events to replay");
                continue;
            };
            if projection.get(&instance.node_id) == Some(&folded) {
                continue;
            }
            let row = JourneyStateRow {
                user_id,
                node_id: instance.node_id.clone(),
                state: folded,
                updated_at: events.last().map(|e| e.at).unwrap_or_else(now),
            };
            self.store.upsert_journey_state(ctx.tenant_id, &row).await?;
            tracing::warn!(
                tenant_id = %ctx.tenant_id,
                user_id = %user_id,
                node_id = %row.node_id,
                state = %row.state,
                "Journey projection healed from event log",
            );
            healed.push(row);
        }
        Ok(healed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_id;

    fn event(event_type: EventType, to: Option<NodeState>) -> NodeEvent {
        NodeEvent {
            id: new_id(),
            instance_id: new_id(),
            seq: 1,
            event_type,
            from_state: None,
            to_state: to,
            actor: new_id(),
            payload: serde_json::Value::Null,
            at: now(),
        }
    }

    #[test]
    fn fold_replays_state_changes() {
        let events = vec![
            event(EventType::Created, None),
            event(EventType::FormSaved, None),
            event(EventType::StateChanged, Some(NodeState::Submitted)),
            event(EventType::CommentAdded, None),
            event(EventType::StateChanged, Some(NodeState::NeedsFixes)),
        ];
        assert_eq!(fold_events(&events), Some(NodeState::NeedsFixes));
    }

    #[test]
    fn fold_of_nothing_is_none() {
        assert_eq!(fold_events(&[]), None);
    }

    #[test]
    fn blank_note_is_none() {
        assert_eq!(clean_note(Some("   ")).unwrap(), None);
        assert_eq!(clean_note(Some(" ok ")).unwrap(), Some("ok".to_string()));
        assert!(clean_note(Some(&"x".repeat(MAX_NOTE_CHARS + 1))).is_err());
    }
}
