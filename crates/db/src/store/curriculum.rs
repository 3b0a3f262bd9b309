use std::collections::BTreeMap;

use campus_core::audit::{compute_integrity_hash, AuditEntry, NewAuditEntry};
use campus_core::curriculum::{
    BuilderNode, Course, NewCourse, NewProgram, NodeInput, Program, ProgramVersion, VersionStatus,
};
use campus_core::error::{CoreError, CoreResult};
use campus_core::playbook::{NewPlaybookVersion, PlaybookVersion};
use campus_core::store::CurriculumStore;
use campus_core::types::{now, DbId};

use super::{try_convert, PgStore};
use crate::error::map_db_error;
use crate::repositories::{
    advisory_xact_lock, AuditRepo, BuilderNodeRepo, PlaybookVersionRepo, ProgramRepo,
    ProgramVersionRepo,
};

#[async_trait::async_trait]
impl CurriculumStore for PgStore {
    async fn create_program(&self, tenant_id: DbId, input: &NewProgram) -> CoreResult<Program> {
        let row = ProgramRepo::create(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn program(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Program>> {
        let row = ProgramRepo::find(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_programs(&self, tenant_id: DbId) -> CoreResult<Vec<Program>> {
        let rows = ProgramRepo::list(&self.pool, tenant_id).await.map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_course(&self, tenant_id: DbId, input: &NewCourse) -> CoreResult<Course> {
        if let Some(program_id) = input.program_id {
            self.require("programs", "program", tenant_id, program_id).await?;
        }
        let row = ProgramRepo::create_course(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn course(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Course>> {
        let row = ProgramRepo::find_course(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_courses(&self, tenant_id: DbId) -> CoreResult<Vec<Course>> {
        let rows = ProgramRepo::list_courses(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn draft_version(&self, tenant_id: DbId, program_id: DbId) -> CoreResult<Option<ProgramVersion>> {
        ProgramVersionRepo::find_draft(&self.pool, tenant_id, program_id)
            .await
            .map_err(map_db_error)?
            .map(ProgramVersion::try_from)
            .transpose()
    }

    async fn latest_published_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
    ) -> CoreResult<Option<ProgramVersion>> {
        ProgramVersionRepo::latest_published(&self.pool, tenant_id, program_id)
            .await
            .map_err(map_db_error)?
            .map(ProgramVersion::try_from)
            .transpose()
    }

    async fn create_draft(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        copy_from: Option<DbId>,
    ) -> CoreResult<ProgramVersion> {
        self.require("programs", "program", tenant_id, program_id).await?;
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // The partial unique index on drafts settles concurrent creators.
        let draft = match ProgramVersionRepo::insert_draft(&mut tx, tenant_id, program_id, at).await {
            Ok(row) => ProgramVersion::try_from(row)?,
            Err(err) => {
                return Err(match map_db_error(err) {
                    CoreError::Conflict { .. } => {
                        CoreError::conflict("Program already has a draft version")
                    }
                    other => other,
                })
            }
        };
        if let Some(source) = copy_from {
            let copied = BuilderNodeRepo::copy_version(&mut tx, tenant_id, source, draft.id, at)
                .await
                .map_err(map_db_error)?;
            tracing::debug!(%program_id, draft_id = %draft.id, copied, "Copied nodes into new draft");
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(draft)
    }

    async fn list_builder_nodes(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<Vec<BuilderNode>> {
        let rows = BuilderNodeRepo::list(&self.pool, tenant_id, version_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn insert_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        input: &NodeInput,
    ) -> CoreResult<BuilderNode> {
        self.require("program_versions", "program_version", tenant_id, version_id)
            .await?;
        match BuilderNodeRepo::insert(&self.pool, tenant_id, version_id, input, now()).await {
            Ok(row) => BuilderNode::try_from(row),
            Err(err) => Err(match map_db_error(err) {
                CoreError::Conflict { .. } => {
                    CoreError::conflict(format!("Node '{}' already exists", input.node_id))
                }
                other => other,
            }),
        }
    }

    async fn update_builder_node(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
        input: &NodeInput,
    ) -> CoreResult<Option<BuilderNode>> {
        BuilderNodeRepo::update(&self.pool, tenant_id, version_id, node_id, input, now())
            .await
            .map_err(map_db_error)?
            .map(BuilderNode::try_from)
            .transpose()
    }

    async fn delete_builder_node(&self, tenant_id: DbId, version_id: DbId, node_id: &str) -> CoreResult<bool> {
        BuilderNodeRepo::delete(&self.pool, tenant_id, version_id, node_id)
            .await
            .map_err(map_db_error)
    }

    async fn set_prerequisites(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        prerequisites: &BTreeMap<String, Vec<String>>,
    ) -> CoreResult<()> {
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        BuilderNodeRepo::clear_prerequisites(&mut tx, tenant_id, version_id, at)
            .await
            .map_err(map_db_error)?;
        for (node_id, prereqs) in prerequisites {
            BuilderNodeRepo::set_prerequisites(&mut tx, tenant_id, version_id, node_id, prereqs, at)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)
    }

    async fn publish_version(
        &self,
        tenant_id: DbId,
        program_id: DbId,
        version_id: DbId,
        playbook: &NewPlaybookVersion,
    ) -> CoreResult<(ProgramVersion, PlaybookVersion)> {
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let locked = ProgramVersionRepo::lock(&mut tx, tenant_id, version_id)
            .await
            .map_err(map_db_error)?
            .map(ProgramVersion::try_from)
            .transpose()?;
        match locked {
            Some(v) if v.program_id == program_id && v.status == VersionStatus::Draft => {}
            Some(_) => return Err(CoreError::conflict("Program version is not a draft")),
            None => return Err(CoreError::not_found("program_version", version_id)),
        }

        let playbook_version: PlaybookVersion =
            PlaybookVersionRepo::insert(&mut *tx, tenant_id, playbook, at)
                .await
                .map_err(map_db_error)?
                .into();
        let published = ProgramVersionRepo::mark_published(&mut tx, version_id, playbook_version.id, at)
            .await
            .map_err(map_db_error)?;
        ProgramRepo::set_active(&mut tx, tenant_id, program_id, version_id, playbook_version.id)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok((ProgramVersion::try_from(published)?, playbook_version))
    }

    async fn append_audit(&self, tenant_id: DbId, entry: &NewAuditEntry) -> CoreResult<AuditEntry> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        advisory_xact_lock(&mut tx, &format!("audit:{tenant_id}"))
            .await
            .map_err(map_db_error)?;

        let prev = AuditRepo::last_hash(&mut tx, tenant_id)
            .await
            .map_err(map_db_error)?;
        let at = now();
        let hash = compute_integrity_hash(prev.as_deref(), &entry.canonical(at));
        let row = AuditRepo::insert(&mut tx, tenant_id, entry, &hash, at)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn list_audit(&self, tenant_id: DbId, limit: i64) -> CoreResult<Vec<AuditEntry>> {
        let rows = AuditRepo::list_recent(&self.pool, tenant_id, limit)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
