//! Building, publishing and re-publishing a program's journey map.

use std::sync::Arc;

use assert_matches::assert_matches;
use campus_core::audit::{action_types, verify_chain};
use campus_core::context::RequestContext;
use campus_core::curriculum::{Edge, FieldSpec, NewProgram, NodeConfig, NodeInput, ProgramBuilder};
use campus_core::error::CoreError;
use campus_core::journey::{JourneyEngine, NodeState};
use campus_core::localized::Localized;
use campus_core::playbook::{CatalogueCache, NodeType, Requirements};
use campus_core::roles::Role;
use campus_core::store::memory::MemoryStore;
use campus_core::store::{CurriculumStore, IdentityStore};
use campus_core::tenancy::NewUser;
use campus_core::types::{new_id, DbId};

fn info(node_id: &str, world: &str, prerequisites: &[&str]) -> NodeInput {
    NodeInput {
        node_id: node_id.into(),
        node_type: NodeType::Info,
        title: Localized::single("en", node_id),
        world_key: world.into(),
        prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        requirements: Requirements::default(),
        config: NodeConfig::default(),
    }
}

fn form(node_id: &str, world: &str, prerequisites: &[&str]) -> NodeInput {
    NodeInput {
        node_type: NodeType::Form,
        config: NodeConfig {
            fields: vec![FieldSpec {
                key: "topic".into(),
                field_type: "text".into(),
                label: Localized::single("en", "Topic"),
                required: true,
                options: Vec::new(),
            }],
            ..NodeConfig::default()
        },
        ..info(node_id, world, prerequisites)
    }
}

struct Setup {
    store: Arc<MemoryStore>,
    builder: ProgramBuilder<MemoryStore>,
    engine: JourneyEngine<MemoryStore>,
    admin: RequestContext,
    program_id: DbId,
}

impl Setup {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let builder = ProgramBuilder::new(Arc::clone(&store));
        let engine = JourneyEngine::new(Arc::clone(&store), Arc::new(CatalogueCache::new()));
        let admin = RequestContext::new(new_id(), new_id(), Role::Admin);
        let program = builder
            .create_program(
                &admin,
                &NewProgram {
                    code: "PHD".into(),
                    title: Localized::single("en", "Doctoral programme"),
                },
            )
            .await
            .unwrap();
        Self {
            store,
            builder,
            engine,
            admin,
            program_id: program.id,
        }
    }

    /// A student enrolled in the program.
    async fn student(&self, username: &str) -> RequestContext {
        let user = self
            .store
            .create_user(&NewUser {
                username: username.into(),
                email: format!("{username}@example.edu"),
                password_hash: String::new(),
                display_name: username.into(),
                program_id: Some(self.program_id),
                cohort_id: None,
            })
            .await
            .unwrap();
        RequestContext::new(self.admin.tenant_id, user.id, Role::Student)
    }
}

#[tokio::test]
async fn published_map_drives_new_journeys() {
    let s = Setup::new().await;
    s.builder
        .create_node(&s.admin, s.program_id, &info("intro", "onboarding", &[]))
        .await
        .unwrap();
    s.builder
        .create_node(&s.admin, s.program_id, &form("proposal", "research", &["intro"]))
        .await
        .unwrap();

    let map = s.builder.get_map(&s.admin, s.program_id).await.unwrap();
    assert_eq!(
        map.edges,
        vec![Edge {
            from: "intro".into(),
            to: "proposal".into()
        }]
    );

    let published = s.builder.publish(&s.admin, s.program_id).await.unwrap();
    assert_eq!(published.playbook_version.version, "PHD.1");
    let program = s.builder.program(&s.admin, s.program_id).await.unwrap();
    assert_eq!(
        program.active_playbook_version_id,
        Some(published.playbook_version.id)
    );

    let student = s.student("ada").await;
    let view = s
        .engine
        .open_node(&student, student.user_id, "proposal")
        .await
        .unwrap();
    assert_eq!(view.playbook_version_id, published.playbook_version.id);
    assert_eq!(view.world, "research");
    assert_matches!(
        s.engine
            .transition(&student, student.user_id, "proposal", NodeState::Submitted, None)
            .await,
        Err(CoreError::IllegalTransition { .. } | CoreError::PrereqNotSatisfied { .. })
    );

    // Publishing without a pending draft is refused.
    assert_matches!(
        s.builder.publish(&s.admin, s.program_id).await,
        Err(CoreError::Conflict { .. })
    );
}

#[tokio::test]
async fn republishing_leaves_running_journeys_pinned() {
    let s = Setup::new().await;
    s.builder
        .create_node(&s.admin, s.program_id, &info("intro", "onboarding", &[]))
        .await
        .unwrap();
    let v1 = s.builder.publish(&s.admin, s.program_id).await.unwrap();

    let early = s.student("early").await;
    s.engine
        .open_node(&early, early.user_id, "intro")
        .await
        .unwrap();

    let draft = s.builder.ensure_draft(&s.admin, s.program_id).await.unwrap();
    assert_eq!(draft.number, 2);
    let copied = s.builder.list_nodes(&s.admin, s.program_id).await.unwrap();
    assert_eq!(copied.len(), 1);
    s.builder
        .create_node(&s.admin, s.program_id, &info("defense", "finish", &["intro"]))
        .await
        .unwrap();
    let v2 = s.builder.publish(&s.admin, s.program_id).await.unwrap();
    assert_eq!(v2.playbook_version.version, "PHD.2");

    assert_matches!(
        s.engine.open_node(&early, early.user_id, "defense").await,
        Err(CoreError::NotFound { .. })
    );
    let progress = s.engine.progress(&early, early.user_id).await.unwrap();
    assert_eq!(progress.playbook_version_id, v1.playbook_version.id);

    let late = s.student("late").await;
    let view = s
        .engine
        .open_node(&late, late.user_id, "defense")
        .await
        .unwrap();
    assert_eq!(view.playbook_version_id, v2.playbook_version.id);
}

#[tokio::test]
async fn node_edits_are_validated() {
    let s = Setup::new().await;
    s.builder
        .create_node(&s.admin, s.program_id, &info("intro", "w", &[]))
        .await
        .unwrap();
    s.builder
        .create_node(&s.admin, s.program_id, &info("next", "w", &["intro"]))
        .await
        .unwrap();

    assert_matches!(
        s.builder
            .create_node(&s.admin, s.program_id, &info("orphan", "w", &["missing"]))
            .await,
        Err(CoreError::NotFound { .. })
    );
    assert_matches!(
        s.builder
            .create_node(&s.admin, s.program_id, &info("intro", "w", &[]))
            .await,
        Err(CoreError::Conflict { .. })
    );
    assert_matches!(
        s.builder
            .update_node(&s.admin, s.program_id, "intro", &info("renamed", "w", &[]))
            .await,
        Err(CoreError::BadInput(_))
    );
    let empty_form = NodeInput {
        node_type: NodeType::Form,
        ..info("f", "w", &[])
    };
    assert_matches!(
        s.builder.create_node(&s.admin, s.program_id, &empty_form).await,
        Err(CoreError::BadInput(_))
    );

    let err = s
        .builder
        .delete_node(&s.admin, s.program_id, "intro")
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict { ref offenders, .. } if offenders == &["next".to_string()]);
    s.builder
        .delete_node(&s.admin, s.program_id, "next")
        .await
        .unwrap();
    s.builder
        .delete_node(&s.admin, s.program_id, "intro")
        .await
        .unwrap();
}

#[tokio::test]
async fn cyclic_map_cannot_be_published() {
    let s = Setup::new().await;
    for id in ["a", "b"] {
        s.builder
            .create_node(&s.admin, s.program_id, &info(id, "w", &[]))
            .await
            .unwrap();
    }
    let edges = vec![
        Edge {
            from: "a".into(),
            to: "b".into(),
        },
        Edge {
            from: "b".into(),
            to: "a".into(),
        },
    ];
    s.builder
        .set_edges(&s.admin, s.program_id, &edges)
        .await
        .unwrap();
    assert_matches!(
        s.builder.publish(&s.admin, s.program_id).await,
        Err(CoreError::BadCatalogue(_))
    );

    assert_matches!(
        s.builder
            .set_edges(
                &s.admin,
                s.program_id,
                &[Edge {
                    from: "a".into(),
                    to: "ghost".into()
                }]
            )
            .await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn curriculum_changes_are_audited_in_a_verifiable_chain() {
    let s = Setup::new().await;
    s.builder
        .create_node(&s.admin, s.program_id, &info("intro", "w", &[]))
        .await
        .unwrap();
    s.builder.publish(&s.admin, s.program_id).await.unwrap();

    let mut entries = s.store.list_audit(s.admin.tenant_id, 100).await.unwrap();
    assert_eq!(entries[0].action, action_types::PUBLISH);
    entries.reverse();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            action_types::PROGRAM_CREATE,
            action_types::DRAFT_CREATE,
            action_types::NODE_CREATE,
            action_types::PUBLISH,
        ]
    );
    assert_eq!(verify_chain(&entries), None);
}

#[tokio::test]
async fn only_admins_edit_the_curriculum() {
    let s = Setup::new().await;
    let advisor = RequestContext::new(s.admin.tenant_id, new_id(), Role::Advisor);
    assert_matches!(
        s.builder
            .create_node(&advisor, s.program_id, &info("x", "w", &[]))
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        s.builder.publish(&advisor, s.program_id).await,
        Err(CoreError::Forbidden(_))
    );
}
