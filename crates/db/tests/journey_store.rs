//! Journey persistence against a real database: idempotent instance
//! creation, revision sequencing, CAS transitions, the event log and reset.

use assert_matches::assert_matches;
use campus_core::error::CoreError;
use campus_core::journey::model::{Decision, EventType, InstanceKey, StateChange};
use campus_core::journey::{FormData, NodeState};
use campus_core::playbook::NewPlaybookVersion;
use campus_core::store::{IdentityStore, JourneyStore};
use campus_core::tenancy::{NewTenant, NewUser, TenantType};
use campus_core::types::{now, DbId};
use campus_db::PgStore;
use sqlx::PgPool;

const PLAYBOOK: &str = r#"{
  "playbook_id": "phd",
  "version": "v1",
  "worlds": [
    {"id": "w1", "nodes": [
      {"id": "A", "type": "form", "title": {"en": "Research proposal"}},
      {"id": "B", "type": "info", "title": {"en": "Ethics briefing"}, "prerequisites": ["A"]}
    ]}
  ]
}"#;

struct Seed {
    store: PgStore,
    tenant: DbId,
    student: DbId,
    version: DbId,
}

async fn seed(pool: PgPool) -> Seed {
    let store = PgStore::new(pool);
    let tenant = store
        .create_tenant(&NewTenant {
            slug: "north-state".into(),
            name: "North State University".into(),
            tenant_type: TenantType::University,
            enabled_services: Vec::new(),
        })
        .await
        .unwrap();
    let student = store
        .create_user(&NewUser {
            username: "ada".into(),
            email: "ada@example.edu".into(),
            password_hash: String::new(),
            display_name: "Ada".into(),
            program_id: None,
            cohort_id: None,
        })
        .await
        .unwrap();
    let version = store
        .insert_playbook_version(
            tenant.id,
            &NewPlaybookVersion::from_raw(PLAYBOOK.to_string()).unwrap(),
        )
        .await
        .unwrap();
    store.activate_playbook_version(tenant.id, version.id).await.unwrap();
    Seed {
        store,
        tenant: tenant.id,
        student: student.id,
        version: version.id,
    }
}

fn key(seed: &Seed, node: &str) -> InstanceKey {
    InstanceKey {
        tenant_id: seed.tenant,
        user_id: seed.student,
        node_id: node.into(),
        playbook_version_id: seed.version,
    }
}

fn submit(seed: &Seed, instance_id: DbId, from: NodeState, to: NodeState) -> StateChange {
    StateChange {
        tenant_id: seed.tenant,
        instance_id,
        user_id: seed.student,
        node_id: "A".into(),
        from,
        to,
        actor: seed.student,
        payload: serde_json::json!({}),
        outcome: None,
        at: now(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_get_or_create_is_idempotent(pool: PgPool) {
    let s = seed(pool).await;

    let (first, created) = s.store.get_or_create_instance(&key(&s, "A"), s.student).await.unwrap();
    assert!(created);
    assert_eq!(first.state, NodeState::Active);
    assert_eq!(first.current_rev, 0);

    let (second, created) = s.store.get_or_create_instance(&key(&s, "A"), s.student).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);

    let events = s.store.list_events(s.tenant, first.id, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Created);
    assert_eq!(events[0].seq, 1);

    assert_eq!(
        s.store.pinned_version(s.tenant, s.student).await.unwrap(),
        Some(s.version)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_concurrent_creators_share_one_instance(pool: PgPool) {
    let s = seed(pool).await;
    let key_a1 = key(&s, "A");
    let key_a2 = key(&s, "A");
    let (a, b) = tokio::join!(
        s.store.get_or_create_instance(&key_a1, s.student),
        s.store.get_or_create_instance(&key_a2, s.student),
    );
    let (a, a_created) = a.unwrap();
    let (b, b_created) = b.unwrap();
    assert_eq!(a.id, b.id);
    assert!(a_created ^ b_created, "exactly one caller creates");

    let instances = s.store.list_instances(s.tenant, s.student).await.unwrap();
    assert_eq!(instances.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_form_revisions_are_sequential(pool: PgPool) {
    let s = seed(pool).await;
    let (instance, _) = s.store.get_or_create_instance(&key(&s, "A"), s.student).await.unwrap();

    for expected in 1..=3 {
        let raw = format!(r#"{{"draft": {expected}}}"#);
        let updated = s
            .store
            .append_form_revision(s.tenant, instance.id, &FormData::parse(&raw).unwrap(), s.student)
            .await
            .unwrap();
        assert_eq!(updated.current_rev, expected);
    }

    let revisions = s.store.list_form_revisions(s.tenant, instance.id).await.unwrap();
    assert_eq!(revisions.iter().map(|r| r.rev).collect::<Vec<_>>(), vec![1, 2, 3]);

    let second = s.store.form_revision(s.tenant, instance.id, 2).await.unwrap().unwrap();
    assert_eq!(second.form_data.as_str(), r#"{"draft": 2}"#);

    let kinds: Vec<EventType> = s
        .store
        .list_events(s.tenant, instance.id, Some(1))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(kinds, vec![EventType::FormSaved; 3]);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_transition_cas_and_immutability(pool: PgPool) {
    let s = seed(pool).await;
    let (instance, _) = s.store.get_or_create_instance(&key(&s, "A"), s.student).await.unwrap();

    let submitted = s
        .store
        .commit_transition(&submit(&s, instance.id, NodeState::Active, NodeState::Submitted))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(submitted.state, NodeState::Submitted);

    // A second writer starting from the stale state loses the CAS.
    let lost = s
        .store
        .commit_transition(&submit(&s, instance.id, NodeState::Active, NodeState::Submitted))
        .await
        .unwrap();
    assert!(lost.is_none());

    let err = s
        .store
        .append_form_revision(s.tenant, instance.id, &FormData::parse("{}").unwrap(), s.student)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::StateImmutable { state: NodeState::Submitted });

    let mut rejection = submit(&s, instance.id, NodeState::Submitted, NodeState::NeedsFixes);
    rejection.outcome = Some((Decision::Rejected, Some("Cite your sources".into())));
    s.store.commit_transition(&rejection).await.unwrap().unwrap();

    let outcomes = s.store.list_outcomes(s.tenant, instance.id).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].decision, Decision::Rejected);

    let states = s.store.journey_states(s.tenant, s.student).await.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].state, NodeState::NeedsFixes);

    let kinds: Vec<EventType> = s
        .store
        .list_events(s.tenant, instance.id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventType::Created,
            EventType::StateChanged,
            EventType::StateChanged,
            EventType::OutcomeRecorded,
        ]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_transition_on_missing_instance_is_not_found(pool: PgPool) {
    let s = seed(pool).await;
    let err = s
        .store
        .commit_transition(&submit(&s, campus_core::types::new_id(), NodeState::Active, NodeState::Submitted))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn tenant_delete_is_soft(pool: PgPool) {
    let s = seed(pool).await;

    assert!(s.store.deactivate_tenant(s.tenant).await.unwrap());
    assert!(!s.store.deactivate_tenant(s.tenant).await.unwrap());

    let tenant = s.store.tenant(s.tenant).await.unwrap().unwrap();
    assert!(!tenant.active);
    assert_eq!(tenant.slug, "north-state");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_reset_journey_cascades(pool: PgPool) {
    let s = seed(pool).await;
    let (instance, _) = s.store.get_or_create_instance(&key(&s, "A"), s.student).await.unwrap();
    s.store
        .append_form_revision(s.tenant, instance.id, &FormData::parse("{}").unwrap(), s.student)
        .await
        .unwrap();
    s.store
        .commit_transition(&submit(&s, instance.id, NodeState::Active, NodeState::Done))
        .await
        .unwrap()
        .unwrap();

    let done = s.store.done_states(s.tenant).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!((done[0].user_id, done[0].node_id.as_str()), (s.student, "A"));

    assert_eq!(s.store.reset_journey(s.tenant, s.student).await.unwrap(), 1);
    assert!(s.store.journey_states(s.tenant, s.student).await.unwrap().is_empty());
    assert!(s.store.done_states(s.tenant).await.unwrap().is_empty());
    assert!(s.store.list_events(s.tenant, instance.id, None).await.unwrap().is_empty());
    assert!(s.store.list_form_revisions(s.tenant, instance.id).await.unwrap().is_empty());
    assert_eq!(s.store.pinned_version(s.tenant, s.student).await.unwrap(), None);

    assert_eq!(s.store.reset_journey(s.tenant, s.student).await.unwrap(), 0);
}
