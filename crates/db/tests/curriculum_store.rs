use std::collections::BTreeMap;

use assert_matches::assert_matches;
use campus_core::audit::{action_types, entities, verify_chain, NewAuditEntry};
use campus_core::curriculum::{NewProgram, NodeConfig, NodeInput, VersionStatus};
use campus_core::error::CoreError;
use campus_core::localized::Localized;
use campus_core::playbook::{NewPlaybookVersion, NodeType, Requirements};
use campus_core::store::{CurriculumStore, IdentityStore};
use campus_core::tenancy::{NewTenant, TenantType};
use campus_core::types::{new_id, DbId};
use campus_db::PgStore;
use sqlx::PgPool;

const PLAYBOOK: &str = r#"{
  "playbook_id": "ma",
  "version": "v1",
  "worlds": [{"id": "w1", "nodes": [{"id": "intro", "type": "info", "title": {"en": "Intro"}}]}]
}"#;

async fn seed(pool: PgPool) -> (PgStore, DbId, DbId) {
    let store = PgStore::new(pool);
    let tenant = store
        .create_tenant(&NewTenant {
            slug: "lakeside".into(),
            name: "Lakeside College".into(),
            tenant_type: TenantType::College,
            enabled_services: Vec::new(),
        })
        .await
        .unwrap();
    let program = store
        .create_program(
            tenant.id,
            &NewProgram {
                code: "MA".into(),
                title: Localized::single("en", "Master of Arts"),
            },
        )
        .await
        .unwrap();
    (store, tenant.id, program.id)
}

fn node(node_id: &str) -> NodeInput {
    NodeInput {
        node_id: node_id.into(),
        node_type: NodeType::Info,
        title: Localized::single("en", node_id),
        world_key: "w1".into(),
        prerequisites: Vec::new(),
        requirements: Requirements::default(),
        config: NodeConfig::default(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_single_draft_per_program(pool: PgPool) {
    let (store, tenant, program) = seed(pool).await;

    let draft = store.create_draft(tenant, program, None).await.unwrap();
    assert_eq!(draft.number, 1);
    assert_eq!(draft.status, VersionStatus::Draft);

    let err = store.create_draft(tenant, program, None).await.unwrap_err();
    assert_matches!(err, CoreError::Conflict { .. });

    let err = store.create_draft(tenant, new_id(), None).await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "program", .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_publish_then_copy_into_next_draft(pool: PgPool) {
    let (store, tenant, program) = seed(pool).await;
    let draft = store.create_draft(tenant, program, None).await.unwrap();
    store.insert_builder_node(tenant, draft.id, &node("intro")).await.unwrap();
    store.insert_builder_node(tenant, draft.id, &node("thesis")).await.unwrap();

    let mut prereqs = BTreeMap::new();
    prereqs.insert("thesis".to_string(), vec!["intro".to_string()]);
    store.set_prerequisites(tenant, draft.id, &prereqs).await.unwrap();

    let playbook = NewPlaybookVersion::from_raw(PLAYBOOK.to_string()).unwrap();
    let (published, playbook_version) = store
        .publish_version(tenant, program, draft.id, &playbook)
        .await
        .unwrap();
    assert_eq!(published.status, VersionStatus::Published);
    assert_eq!(published.playbook_version_id, Some(playbook_version.id));

    let program_row = store.program(tenant, program).await.unwrap().unwrap();
    assert_eq!(program_row.active_version_id, Some(draft.id));
    assert_eq!(program_row.active_playbook_version_id, Some(playbook_version.id));

    // Publishing twice is a conflict.
    let err = store
        .publish_version(tenant, program, draft.id, &playbook)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict { .. });

    let next = store.create_draft(tenant, program, Some(draft.id)).await.unwrap();
    assert_eq!(next.number, 2);
    let nodes = store.list_builder_nodes(tenant, next.id).await.unwrap();
    assert_eq!(
        nodes.iter().map(|n| n.node_id.as_str()).collect::<Vec<_>>(),
        vec!["intro", "thesis"]
    );
    assert_eq!(nodes[1].prerequisites, vec!["intro".to_string()]);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_duplicate_node_id_conflicts(pool: PgPool) {
    let (store, tenant, program) = seed(pool).await;
    let draft = store.create_draft(tenant, program, None).await.unwrap();
    store.insert_builder_node(tenant, draft.id, &node("intro")).await.unwrap();

    let err = store
        .insert_builder_node(tenant, draft.id, &node("intro"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict { .. });

    assert!(store.delete_builder_node(tenant, draft.id, "intro").await.unwrap());
    assert!(!store.delete_builder_node(tenant, draft.id, "intro").await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_audit_chain_verifies(pool: PgPool) {
    let (store, tenant, program) = seed(pool).await;
    let actor = new_id();

    for action in [action_types::PROGRAM_CREATE, action_types::DRAFT_CREATE, action_types::PUBLISH] {
        store
            .append_audit(
                tenant,
                &NewAuditEntry::new(actor, action, entities::PROGRAM, program)
                    .with_details(serde_json::json!({"code": "MA", "attempt": 1})),
            )
            .await
            .unwrap();
    }

    let mut entries = store.list_audit(tenant, 10).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].action, action_types::PUBLISH);

    entries.reverse();
    assert_eq!(verify_chain(&entries), None);
}
