//! End-to-end journey flows against the in-memory store.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use campus_core::context::RequestContext;
use campus_core::error::CoreError;
use campus_core::journey::model::{Decision, EventType, JourneyStateRow};
use campus_core::journey::{
    FormData, JourneyEngine, JourneyObserver, NodeState, TransitionNotice,
};
use campus_core::playbook::CatalogueCache;
use campus_core::roles::Role;
use campus_core::store::memory::MemoryStore;
use campus_core::store::{CurriculumStore, IdentityStore, JourneyStore};
use campus_core::tenancy::Membership;
use campus_core::types::{new_id, now, DbId};

const PLAYBOOK: &str = r#"{
  "playbook_id": "phd",
  "version": "v1",
  "worlds": [
    {"id": "w1", "nodes": [
      {"id": "A", "type": "form", "title": {"en": "Research proposal"}},
      {"id": "B", "type": "info", "title": {"en": "Ethics briefing"}, "prerequisites": ["A"]},
      {"id": "C", "type": "upload", "title": {"en": "Supervisor CV"}, "prerequisites": ["B"],
       "requirements": {"uploads": [{"key": "cv", "required": true, "label": {"en": "CV"}}]}}
    ]},
    {"id": "w2", "scored": false, "nodes": [
      {"id": "U", "type": "upload", "title": {"en": "Transcript"},
       "requirements": {"uploads": [
         {"key": "transcript", "required": true, "label": {"en": "Transcript"}},
         {"key": "extra", "required": false, "label": {"en": "Extra"}}
       ]}},
      {"id": "X", "type": "confirmTask", "title": {"en": "Plagiarism check"},
       "requirements": {"external_check": true}}
    ]}
  ]
}"#;

#[derive(Default)]
struct Recorder(Mutex<Vec<TransitionNotice>>);

impl JourneyObserver for Recorder {
    fn on_transition(&self, notice: &TransitionNotice) {
        self.0.lock().unwrap().push(notice.clone());
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    engine: Arc<JourneyEngine<MemoryStore>>,
    recorder: Arc<Recorder>,
    tenant: DbId,
    admin: RequestContext,
    advisor: RequestContext,
    student: RequestContext,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let engine = JourneyEngine::new(Arc::clone(&store), Arc::new(CatalogueCache::new()))
            .with_observer(recorder.clone());
        let tenant = new_id();
        let admin = RequestContext::new(tenant, new_id(), Role::Admin);
        engine
            .install_playbook(&admin, PLAYBOOK.to_string(), true)
            .await
            .unwrap();
        Self {
            store,
            engine: Arc::new(engine),
            recorder,
            tenant,
            advisor: RequestContext::new(tenant, new_id(), Role::Advisor),
            student: RequestContext::new(tenant, new_id(), Role::Student),
            admin,
        }
    }

    fn sid(&self) -> DbId {
        self.student.user_id
    }

    async fn save(&self, node: &str, raw: &str) -> i32 {
        self.engine
            .save_form(&self.student, node, &FormData::parse(raw).unwrap())
            .await
            .unwrap()
            .current_rev
    }

    async fn submit(&self, node: &str) -> Result<NodeState, CoreError> {
        self.engine
            .transition(&self.student, self.sid(), node, NodeState::Submitted, None)
            .await
            .map(|i| i.state)
    }

    async fn state_of(&self, node: &str) -> Option<NodeState> {
        self.engine
            .journey_state(&self.student, self.sid())
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.node_id == node)
            .map(|r| r.state)
    }

    async fn event_kinds(&self, node: &str) -> Vec<EventType> {
        self.engine
            .events(&self.student, self.sid(), node, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Drives `node` to done via submit and advisor approval.
    async fn complete(&self, node: &str) {
        self.engine.open_node(&self.student, self.sid(), node).await.unwrap();
        self.submit(node).await.unwrap();
        self.engine
            .transition(&self.advisor, self.sid(), node, NodeState::Done, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn happy_path_submission_and_approval() {
    let h = Harness::new().await;

    let view = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_eq!(view.state, NodeState::Active);
    assert_eq!(view.current_rev, 0);
    assert!(view.form.is_none());

    assert_eq!(h.save("A", r#"{"x":1}"#).await, 1);
    assert_eq!(h.submit("A").await.unwrap(), NodeState::Submitted);
    h.engine
        .transition(&h.admin, h.sid(), "A", NodeState::Done, None)
        .await
        .unwrap();

    let events = h
        .engine
        .events(&h.student, h.sid(), "A", None)
        .await
        .unwrap();
    let kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::Created,
            EventType::FormSaved,
            EventType::StateChanged,
            EventType::StateChanged,
        ]
    );
    assert_eq!(
        (events[2].from_state, events[2].to_state),
        (Some(NodeState::Active), Some(NodeState::Submitted))
    );
    assert_eq!(
        (events[3].from_state, events[3].to_state),
        (Some(NodeState::Submitted), Some(NodeState::Done))
    );
    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    // Approving A materializes B, which can now be submitted.
    assert_eq!(h.state_of("B").await, Some(NodeState::Active));
    assert_eq!(h.submit("B").await.unwrap(), NodeState::Submitted);

    let view = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_eq!(view.form.as_ref().map(|f| f.data.as_str()), Some(r#"{"x":1}"#));
    assert_eq!(view.outcomes.len(), 1);
    assert_eq!(view.outcomes[0].decision, Decision::Approved);
}

#[tokio::test]
async fn prerequisite_blocks_submission_without_side_effects() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    h.engine.open_node(&h.student, h.sid(), "B").await.unwrap();

    let err = h.submit("B").await.unwrap_err();
    assert_matches!(err, CoreError::PrereqNotSatisfied { ref blocking } if blocking == &["A".to_string()]);
    assert_eq!(h.state_of("B").await, Some(NodeState::Active));
    assert_eq!(h.event_kinds("B").await, vec![EventType::Created]);
}

#[tokio::test]
async fn blocking_prerequisites_are_listed_in_topological_order() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "C").await.unwrap();
    h.engine
        .attach_upload(&h.student, "C", "cv", new_id())
        .await
        .unwrap();
    let err = h.submit("C").await.unwrap_err();
    assert_matches!(err, CoreError::PrereqNotSatisfied { ref blocking } if blocking == &["B".to_string()]);
}

#[tokio::test]
async fn concurrent_saves_get_distinct_revisions() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    let f1 = FormData::parse(r#"{"draft":1}"#).unwrap();
    let f2 = FormData::parse(r#"{"draft":2}"#).unwrap();

    let (r1, r2) = tokio::join!(
        h.engine.save_form(&h.student, "A", &f1),
        h.engine.save_form(&h.student, "A", &f2),
    );
    let mut revs = vec![r1.unwrap().current_rev, r2.unwrap().current_rev];
    revs.sort_unstable();
    assert_eq!(revs, vec![1, 2]);

    let view = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_eq!(view.current_rev, 2);
    let saved = h
        .event_kinds("A")
        .await
        .into_iter()
        .filter(|k| *k == EventType::FormSaved)
        .count();
    assert_eq!(saved, 2);
}

#[tokio::test]
async fn concurrent_openers_converge_on_one_instance() {
    let h = Harness::new().await;
    let views = futures::future::join_all(
        (0..8).map(|_| h.engine.open_node(&h.student, h.sid(), "A")),
    )
    .await;
    let ids: Vec<DbId> = views.into_iter().map(|v| v.unwrap().instance_id).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.event_kinds("A").await, vec![EventType::Created]);
}

#[tokio::test]
async fn lock_freezes_saves_until_unlocked() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();

    h.engine
        .transition(&h.admin, h.sid(), "A", NodeState::Locked, Some("audit hold"))
        .await
        .unwrap();
    let err = h
        .engine
        .save_form(&h.student, "A", &FormData::parse(r#"{"x":2}"#).unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::StateImmutable { state: NodeState::Locked });

    h.engine
        .transition(&h.admin, h.sid(), "A", NodeState::Active, None)
        .await
        .unwrap();
    assert_eq!(h.save("A", r#"{"x":2}"#).await, 2);
}

#[tokio::test]
async fn submitted_node_rejects_saves() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();
    let err = h
        .engine
        .save_form(&h.student, "A", &FormData::parse("{}").unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::StateImmutable { state: NodeState::Submitted });
}

#[tokio::test]
async fn needs_fixes_requires_note_and_new_revision() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();

    let err = h
        .engine
        .transition(&h.advisor, h.sid(), "A", NodeState::NeedsFixes, Some("   "))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::BadInput(_));

    h.engine
        .transition(&h.advisor, h.sid(), "A", NodeState::NeedsFixes, Some("Cite sources"))
        .await
        .unwrap();
    let kinds = h.event_kinds("A").await;
    assert_eq!(kinds.last(), Some(&EventType::OutcomeRecorded));

    // Resubmitting without a new revision is refused.
    assert_matches!(
        h.submit("A").await,
        Err(CoreError::IllegalTransition { from: NodeState::NeedsFixes, to: NodeState::Submitted, .. })
    );
    assert_eq!(h.save("A", r#"{"x":1,"sources":true}"#).await, 2);
    assert_eq!(h.submit("A").await.unwrap(), NodeState::Submitted);

    h.engine
        .transition(&h.advisor, h.sid(), "A", NodeState::Done, Some("Thanks"))
        .await
        .unwrap();
    let view = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    let decisions: Vec<_> = view.outcomes.iter().map(|o| o.decision).collect();
    assert_eq!(decisions, vec![Decision::Rejected, Decision::Approved]);
    assert_eq!(view.outcomes[0].note.as_deref(), Some("Cite sources"));
}

#[tokio::test]
async fn form_node_needs_a_revision_before_submit() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_matches!(
        h.submit("A").await,
        Err(CoreError::IllegalTransition { from: NodeState::Active, to: NodeState::Submitted, .. })
    );
}

#[tokio::test]
async fn undeclared_edges_are_illegal() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    let err = h
        .engine
        .transition(&h.advisor, h.sid(), "A", NodeState::NeedsFixes, Some("no"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::IllegalTransition { from: NodeState::Active, .. });
}

#[tokio::test]
async fn students_cannot_approve_or_touch_other_journeys() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();

    assert_matches!(
        h.engine
            .transition(&h.student, h.sid(), "A", NodeState::Done, None)
            .await,
        Err(CoreError::Forbidden(_))
    );

    let other = RequestContext::new(h.tenant, new_id(), Role::Student);
    assert_matches!(
        h.engine.open_node(&other, h.sid(), "A").await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        h.engine.add_comment(&other, h.sid(), "A", "hi").await,
        Err(CoreError::Forbidden(_))
    );
}

#[tokio::test]
async fn reviewer_cannot_open_an_unstarted_node() {
    let h = Harness::new().await;
    assert_matches!(
        h.engine.open_node(&h.advisor, h.sid(), "A").await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn upload_slots_gate_submission() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "U").await.unwrap();

    assert_matches!(
        h.engine
            .attach_upload(&h.student, "U", "passport", new_id())
            .await,
        Err(CoreError::BadInput(_))
    );
    assert_matches!(h.submit("U").await, Err(CoreError::IllegalTransition { .. }));

    let doc = new_id();
    let view = h
        .engine
        .attach_upload(&h.student, "U", "transcript", doc)
        .await
        .unwrap();
    let slot = view.slots.iter().find(|s| s.key == "transcript").unwrap();
    assert_eq!(slot.document_id, Some(doc));
    assert!(view.slots.iter().any(|s| s.key == "extra" && s.document_id.is_none()));

    assert_eq!(h.submit("U").await.unwrap(), NodeState::Submitted);
}

#[tokio::test]
async fn external_check_round_trip_is_system_only() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "X").await.unwrap();
    h.submit("X").await.unwrap();

    assert_matches!(
        h.engine
            .transition(&h.admin, h.sid(), "X", NodeState::Waiting, None)
            .await,
        Err(CoreError::Forbidden(_))
    );

    let system = RequestContext::system(h.tenant);
    h.engine
        .transition(&system, h.sid(), "X", NodeState::Waiting, None)
        .await
        .unwrap();
    assert_eq!(h.state_of("X").await, Some(NodeState::Waiting));
    h.engine
        .transition(&system, h.sid(), "X", NodeState::Submitted, None)
        .await
        .unwrap();
    assert_eq!(h.state_of("X").await, Some(NodeState::Submitted));

    // A node without an external check never enters waiting.
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();
    assert_matches!(
        h.engine
            .transition(&system, h.sid(), "A", NodeState::Waiting, None)
            .await,
        Err(CoreError::IllegalTransition { .. })
    );
}

#[tokio::test]
async fn admin_override_marks_payload() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_matches!(
        h.engine
            .transition(&h.advisor, h.sid(), "A", NodeState::Done, None)
            .await,
        Err(CoreError::Forbidden(_))
    );
    h.engine
        .transition(&h.admin, h.sid(), "A", NodeState::Done, Some("waived"))
        .await
        .unwrap();

    let events = h.engine.events(&h.admin, h.sid(), "A", None).await.unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::StateChanged);
    assert_eq!(last.payload["override"], serde_json::json!(true));
    assert_eq!(last.payload["note"], serde_json::json!("waived"));
    assert_eq!(last.actor, h.admin.user_id);
}

#[tokio::test]
async fn events_since_returns_the_tail() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.engine
        .add_comment(&h.advisor, h.sid(), "A", "Looks good so far")
        .await
        .unwrap();
    let tail = h.engine.events(&h.student, h.sid(), "A", Some(2)).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].event_type, EventType::CommentAdded);
    assert_eq!(tail[0].payload["text"], serde_json::json!("Looks good so far"));

    assert_matches!(
        h.engine.add_comment(&h.student, h.sid(), "A", "  ").await,
        Err(CoreError::BadInput(_))
    );
}

#[tokio::test]
async fn observer_sees_every_committed_transition() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();
    let _ = h.submit("A").await;

    let seen = h.recorder.0.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].node_id, "A");
    assert_eq!((seen[0].from, seen[0].to), (NodeState::Active, NodeState::Submitted));
    assert_eq!(seen[0].correlation_id, h.student.correlation_id);
}

#[tokio::test]
async fn progress_counts_done_nodes_per_world() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.complete("A").await;
    h.complete("B").await;

    let progress = h.engine.progress(&h.student, h.sid()).await.unwrap();
    assert_eq!(progress.total, 5);
    assert_eq!(progress.done, 2);
    assert!(!progress.complete);
    let w1 = progress.worlds.iter().find(|w| w.world == "w1").unwrap();
    assert_eq!((w1.done, w1.total), (2, 3));
    assert!(!h.engine.is_program_complete(&h.student, h.sid()).await.unwrap());
}

#[tokio::test]
async fn reconcile_heals_a_diverged_projection() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();

    h.store
        .upsert_journey_state(
            h.tenant,
            &JourneyStateRow {
                user_id: h.sid(),
                node_id: "A".into(),
                state: NodeState::Done,
                updated_at: now(),
            },
        )
        .await
        .unwrap();
    assert_eq!(h.state_of("A").await, Some(NodeState::Done));

    assert_matches!(
        h.engine.reconcile(&h.advisor, h.sid()).await,
        Err(CoreError::Forbidden(_))
    );
    let healed = h.engine.reconcile(&h.admin, h.sid()).await.unwrap();
    assert_eq!(healed.len(), 1);
    assert_eq!(healed[0].state, NodeState::Submitted);
    assert_eq!(h.state_of("A").await, Some(NodeState::Submitted));
    assert!(h.engine.reconcile(&h.admin, h.sid()).await.unwrap().is_empty());
}

#[tokio::test]
async fn scoreboard_ranks_scored_completions() {
    let h = Harness::new().await;
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();
    h.engine
        .transition(&h.advisor, h.sid(), "A", NodeState::Done, None)
        .await
        .unwrap();

    let peer = new_id();
    let only_unscored = new_id();
    for (user_id, node_id) in [(peer, "A"), (peer, "B"), (peer, "U"), (only_unscored, "U")] {
        h.store
            .upsert_journey_state(
                h.tenant,
                &JourneyStateRow {
                    user_id,
                    node_id: node_id.into(),
                    state: NodeState::Done,
                    updated_at: now(),
                },
            )
            .await
            .unwrap();
    }

    let board = h.engine.scoreboard(&h.student).await.unwrap();
    assert_eq!(board.total_users, 2);
    assert_eq!(board.average, 150);
    let top: Vec<(DbId, u32, usize)> = board.top.iter().map(|e| (e.user_id, e.total_score, e.rank)).collect();
    assert_eq!(top, vec![(peer, 200, 1), (h.sid(), 100, 2)]);
    assert_eq!((board.me.total_score, board.me.rank), (100, 2));

    let outsider = h.engine.scoreboard(&h.advisor).await.unwrap();
    assert_eq!(outsider.me.user_id, h.advisor.user_id);
    assert_eq!((outsider.me.total_score, outsider.me.rank), (0, 3));
}

#[tokio::test]
async fn scoreboard_keeps_only_the_top_five() {
    let h = Harness::new().await;
    for _ in 0..7 {
        h.store
            .upsert_journey_state(
                h.tenant,
                &JourneyStateRow {
                    user_id: new_id(),
                    node_id: "A".into(),
                    state: NodeState::Done,
                    updated_at: now(),
                },
            )
            .await
            .unwrap();
    }
    let board = h.engine.scoreboard(&h.student).await.unwrap();
    assert_eq!(board.top.len(), 5);
    assert_eq!(board.total_users, 7);
    assert_eq!(board.average, 100);
    assert_eq!(board.me.rank, 8);
}

#[tokio::test]
async fn reset_wipes_the_journey_and_is_audited() {
    let h = Harness::new().await;
    h.store
        .upsert_membership(&Membership {
            tenant_id: h.tenant,
            user_id: h.sid(),
            role: Role::Student,
        })
        .await
        .unwrap();
    h.save("A", r#"{"x":1}"#).await;
    h.submit("A").await.unwrap();
    h.engine.open_node(&h.student, h.sid(), "U").await.unwrap();

    assert_matches!(
        h.engine.reset(&h.advisor, h.sid()).await,
        Err(CoreError::Forbidden(_))
    );
    assert_eq!(h.engine.reset(&h.admin, h.sid()).await.unwrap(), 2);
    assert!(h.engine.journey_state(&h.student, h.sid()).await.unwrap().is_empty());

    let audit = h.store.list_audit(h.tenant, 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "journey_reset");
    assert_eq!(audit[0].entity_id, h.sid());
    assert_eq!(audit[0].details["removed_instances"], 2);

    let view = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    assert_eq!((view.state, view.current_rev), (NodeState::Active, 0));
    assert!(view.form.is_none());
    assert_eq!(h.event_kinds("A").await, vec![EventType::Created]);

    assert_matches!(
        h.engine.reset(&h.admin, new_id()).await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn journeys_stay_pinned_when_a_new_version_is_activated() {
    let h = Harness::new().await;
    let first = h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();

    let v2 = PLAYBOOK.replace(r#""version": "v1""#, r#""version": "v2""#);
    let installed = h.engine.install_playbook(&h.admin, v2, true).await.unwrap();
    assert_ne!(installed.id, first.playbook_version_id);

    let again = h.engine.open_node(&h.student, h.sid(), "B").await.unwrap();
    assert_eq!(again.playbook_version_id, first.playbook_version_id);

    let newcomer = RequestContext::new(h.tenant, new_id(), Role::Student);
    let fresh = h
        .engine
        .open_node(&newcomer, newcomer.user_id, "A")
        .await
        .unwrap();
    assert_eq!(fresh.playbook_version_id, installed.id);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();

    let foreign_admin = RequestContext::new(new_id(), new_id(), Role::Admin);
    assert_matches!(
        h.engine.journey_state(&foreign_admin, h.sid()).await,
        Ok(rows) if rows.is_empty()
    );
    assert_matches!(
        h.engine.open_node(&foreign_admin, h.sid(), "A").await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn cancelled_context_stops_before_writing() {
    let h = Harness::new().await;
    h.engine.open_node(&h.student, h.sid(), "A").await.unwrap();
    let ctx = h.student.clone().with_cancel(tokio_util::sync::CancellationToken::new());
    ctx.cancel.cancel();
    assert_matches!(
        h.engine
            .save_form(&ctx, "A", &FormData::parse("{}").unwrap())
            .await,
        Err(CoreError::Cancelled)
    );
    assert_eq!(h.event_kinds("A").await, vec![EventType::Created]);
}
