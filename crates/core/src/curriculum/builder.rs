use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::audit::{action_types, entities, NewAuditEntry};
use crate::capabilities::{can, Action, Resource};
use crate::context::RequestContext;
use crate::curriculum::{
    build_playbook, edges_to_prerequisites, BuilderMap, BuilderNode, Course, Edge, NewCourse,
    NewProgram, NodeInput, Program, ProgramVersion,
};
use crate::error::{CoreError, CoreResult};
use crate::playbook::{NewPlaybookVersion, PlaybookVersion};
use crate::store::Store;
use crate::types::DbId;

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub program_version: ProgramVersion,
    pub playbook_version: PlaybookVersion,
}

/// Programs, courses and the draft journey map of each program.
///
/// Every mutation lands on the program's single draft version, created on
/// demand from the latest published one, and is recorded in the audit log.
pub struct ProgramBuilder<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> ProgramBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn audit(&self, ctx: &RequestContext, entry: NewAuditEntry) -> CoreResult<()> {
        self.store.append_audit(ctx.tenant_id, &entry).await?;
        Ok(())
    }

    // -- Programs and courses -----------------------------------------------

    pub async fn create_program(&self, ctx: &RequestContext, input: &NewProgram) -> CoreResult<Program> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        let program = self.store.create_program(ctx.tenant_id, input).await?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::PROGRAM_CREATE, entities::PROGRAM, program.id)
                .with_details(serde_json::json!({ "code": program.code })),
        )
        .await?;
        tracing::info!(tenant_id = %ctx.tenant_id, program_id = %program.id, code = %program.code, "Program created");
        Ok(program)
    }

    pub async fn list_programs(&self, ctx: &RequestContext) -> CoreResult<Vec<Program>> {
        ctx.checkpoint()?;
        self.store.list_programs(ctx.tenant_id).await
    }

    pub async fn program(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<Program> {
        ctx.checkpoint()?;
        self.store
            .program(ctx.tenant_id, program_id)
            .await?
            .ok_or_else(|| CoreError::not_found("program", program_id))
    }

    pub async fn create_course(&self, ctx: &RequestContext, input: &NewCourse) -> CoreResult<Course> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        let course = self.store.create_course(ctx.tenant_id, input).await?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::COURSE_CREATE, entities::COURSE, course.id)
                .with_details(serde_json::json!({ "code": course.code, "credits": course.credits })),
        )
        .await?;
        Ok(course)
    }

    pub async fn list_courses(&self, ctx: &RequestContext) -> CoreResult<Vec<Course>> {
        ctx.checkpoint()?;
        self.store.list_courses(ctx.tenant_id).await
    }

    // -- Versions -----------------------------------------------------------

    /// The program's draft, created from the latest published version when
    /// there is none.
    pub async fn ensure_draft(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<ProgramVersion> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        self.program(ctx, program_id).await?;
        if let Some(draft) = self.store.draft_version(ctx.tenant_id, program_id).await? {
            return Ok(draft);
        }
        let source = self
            .store
            .latest_published_version(ctx.tenant_id, program_id)
            .await?
            .map(|v| v.id);
        ctx.checkpoint()?;
        let draft = match self.store.create_draft(ctx.tenant_id, program_id, source).await {
            Ok(draft) => draft,
            // A concurrent caller created it first.
            Err(CoreError::Conflict { .. }) => {
                return self
                    .store
                    .draft_version(ctx.tenant_id, program_id)
                    .await?
                    .ok_or_else(|| CoreError::conflict("Draft version changed concurrently"));
            }
            Err(e) => return Err(e),
        };
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::DRAFT_CREATE, entities::PROGRAM_VERSION, draft.id)
                .with_details(serde_json::json!({ "number": draft.number, "copied_from": source })),
        )
        .await?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            program_id = %program_id,
            number = draft.number,
            "Draft program version created",
        );
        Ok(draft)
    }

    /// Draft if one exists, else the latest published version.
    async fn current_version(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<Option<ProgramVersion>> {
        self.program(ctx, program_id).await?;
        if let Some(draft) = self.store.draft_version(ctx.tenant_id, program_id).await? {
            return Ok(Some(draft));
        }
        self.store.latest_published_version(ctx.tenant_id, program_id).await
    }

    // -- Nodes --------------------------------------------------------------

    pub async fn list_nodes(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<Vec<BuilderNode>> {
        match self.current_version(ctx, program_id).await? {
            Some(v) => self.store.list_builder_nodes(ctx.tenant_id, v.id).await,
            None => Ok(Vec::new()),
        }
    }

    fn check_prerequisites_exist(nodes: &[BuilderNode], input: &NodeInput) -> CoreResult<()> {
        let known: BTreeSet<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        match input.prerequisites.iter().find(|p| !known.contains(p.as_str())) {
            Some(missing) => Err(CoreError::not_found("builder_node", missing)),
            None => Ok(()),
        }
    }

    pub async fn create_node(&self, ctx: &RequestContext, program_id: DbId, input: &NodeInput) -> CoreResult<BuilderNode> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        input.validate()?;
        let draft = self.ensure_draft(ctx, program_id).await?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        Self::check_prerequisites_exist(&nodes, input)?;
        ctx.checkpoint()?;
        let node = self.store.insert_builder_node(ctx.tenant_id, draft.id, input).await?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::NODE_CREATE, entities::BUILDER_NODE, node.id)
                .with_details(serde_json::json!({ "node_id": node.node_id, "type": node.node_type })),
        )
        .await?;
        Ok(node)
    }

    pub async fn update_node(
        &self,
        ctx: &RequestContext,
        program_id: DbId,
        node_id: &str,
        input: &NodeInput,
    ) -> CoreResult<BuilderNode> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        if input.node_id != node_id {
            return Err(CoreError::BadInput("Node ids cannot be renamed".into()));
        }
        input.validate()?;
        let draft = self.ensure_draft(ctx, program_id).await?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        Self::check_prerequisites_exist(&nodes, input)?;
        ctx.checkpoint()?;
        let node = self
            .store
            .update_builder_node(ctx.tenant_id, draft.id, node_id, input)
            .await?
            .ok_or_else(|| CoreError::not_found("builder_node", node_id))?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::NODE_UPDATE, entities::BUILDER_NODE, node.id)
                .with_details(serde_json::json!({ "node_id": node.node_id })),
        )
        .await?;
        Ok(node)
    }

    /// Delete a draft node. A node other nodes depend on must be unlinked
    /// first.
    pub async fn delete_node(&self, ctx: &RequestContext, program_id: DbId, node_id: &str) -> CoreResult<()> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        let draft = self.ensure_draft(ctx, program_id).await?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        let Some(target) = nodes.iter().find(|n| n.node_id == node_id) else {
            return Err(CoreError::not_found("builder_node", node_id));
        };
        let dependents: Vec<String> = nodes
            .iter()
            .filter(|n| n.prerequisites.iter().any(|p| p == node_id))
            .map(|n| n.node_id.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(CoreError::Conflict {
                message: format!("Node '{node_id}' is a prerequisite of other nodes"),
                reason: None,
                offenders: dependents,
            });
        }
        ctx.checkpoint()?;
        if !self.store.delete_builder_node(ctx.tenant_id, draft.id, node_id).await? {
            return Err(CoreError::not_found("builder_node", node_id));
        }
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::NODE_DELETE, entities::BUILDER_NODE, target.id)
                .with_details(serde_json::json!({ "node_id": node_id })),
        )
        .await
    }

    // -- Map ----------------------------------------------------------------

    pub async fn get_map(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<BuilderMap> {
        let version = self.current_version(ctx, program_id).await?;
        let nodes = match &version {
            Some(v) => self.store.list_builder_nodes(ctx.tenant_id, v.id).await?,
            None => Vec::new(),
        };
        Ok(BuilderMap::new(version, nodes))
    }

    /// Replace every prerequisite edge of the draft.
    pub async fn set_edges(&self, ctx: &RequestContext, program_id: DbId, edges: &[Edge]) -> CoreResult<BuilderMap> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        let draft = self.ensure_draft(ctx, program_id).await?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        let ids: BTreeSet<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
        let prerequisites = edges_to_prerequisites(&ids, edges)?;
        ctx.checkpoint()?;
        self.store
            .set_prerequisites(ctx.tenant_id, draft.id, &prerequisites)
            .await?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::MAP_UPDATE, entities::PROGRAM_VERSION, draft.id)
                .with_details(serde_json::json!({ "edges": edges.len() })),
        )
        .await?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        Ok(BuilderMap::new(Some(draft), nodes))
    }

    // -- Publish ------------------------------------------------------------

    /// Validate the draft as a catalogue, persist it as an immutable
    /// playbook version and make it the program's active version. Journeys
    /// already running stay on the version they started on.
    pub async fn publish(&self, ctx: &RequestContext, program_id: DbId) -> CoreResult<PublishOutcome> {
        can(ctx, Action::PublishCurriculum, Resource::Tenant)?;
        let program = self.program(ctx, program_id).await?;
        let draft = self
            .store
            .draft_version(ctx.tenant_id, program_id)
            .await?
            .ok_or_else(|| CoreError::conflict("Program has no draft to publish"))?;
        let nodes = self.store.list_builder_nodes(ctx.tenant_id, draft.id).await?;
        let raw = build_playbook(&program, draft.number, &nodes)?;
        let playbook = NewPlaybookVersion::from_raw(raw)?;

        ctx.checkpoint()?;
        let (program_version, playbook_version) = self
            .store
            .publish_version(ctx.tenant_id, program_id, draft.id, &playbook)
            .await?;
        self.audit(
            ctx,
            NewAuditEntry::new(ctx.user_id, action_types::PUBLISH, entities::PROGRAM_VERSION, program_version.id)
                .with_details(serde_json::json!({
                    "version": playbook_version.version,
                    "checksum": playbook_version.checksum,
                    "playbook_version_id": playbook_version.id,
                })),
        )
        .await?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            program_id = %program_id,
            version = %playbook_version.version,
            checksum = %playbook_version.checksum,
            "Program version published",
        );
        Ok(PublishOutcome {
            program_version,
            playbook_version,
        })
    }
}
