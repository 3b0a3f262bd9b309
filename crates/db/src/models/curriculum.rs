//! Program, course, version, builder node and audit rows.

use campus_core::audit::AuditEntry;
use campus_core::curriculum::{BuilderNode, Course, NodeConfig, Program, ProgramVersion, VersionStatus};
use campus_core::error::CoreError;
use campus_core::localized::Localized;
use campus_core::playbook::{NodeType, Requirements};
use campus_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::corrupt;

#[derive(Debug, Clone, FromRow)]
pub struct ProgramRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub code: String,
    pub title: Json<Localized>,
    pub active_version_id: Option<DbId>,
    pub active_playbook_version_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl From<ProgramRow> for Program {
    fn from(row: ProgramRow) -> Self {
        Program {
            id: row.id,
            tenant_id: row.tenant_id,
            code: row.code,
            title: row.title.0,
            active_version_id: row.active_version_id,
            active_playbook_version_id: row.active_playbook_version_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CourseRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_id: Option<DbId>,
    pub code: String,
    pub title: Json<Localized>,
    pub credits: i32,
    pub created_at: Timestamp,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            tenant_id: row.tenant_id,
            program_id: row.program_id,
            code: row.code,
            title: row.title.0,
            credits: row.credits,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProgramVersionRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_id: DbId,
    pub number: i32,
    pub status: String,
    pub playbook_version_id: Option<DbId>,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

impl TryFrom<ProgramVersionRow> for ProgramVersion {
    type Error = CoreError;

    fn try_from(row: ProgramVersionRow) -> Result<Self, Self::Error> {
        let status =
            VersionStatus::parse(&row.status).ok_or_else(|| corrupt("version status", &row.status))?;
        Ok(ProgramVersion {
            id: row.id,
            tenant_id: row.tenant_id,
            program_id: row.program_id,
            number: row.number,
            status,
            playbook_version_id: row.playbook_version_id,
            created_at: row.created_at,
            published_at: row.published_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BuilderNodeRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_version_id: DbId,
    pub node_id: String,
    pub node_type: String,
    pub title: Json<Localized>,
    pub world_key: String,
    pub prerequisites: Vec<String>,
    pub requirements: Json<Requirements>,
    pub config: Json<NodeConfig>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Node types are stored in their serialized (camelCase) form.
pub(crate) fn parse_node_type(raw: &str) -> Result<NodeType, CoreError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| corrupt("node type", raw))
}

impl TryFrom<BuilderNodeRow> for BuilderNode {
    type Error = CoreError;

    fn try_from(row: BuilderNodeRow) -> Result<Self, Self::Error> {
        Ok(BuilderNode {
            node_type: parse_node_type(&row.node_type)?,
            id: row.id,
            tenant_id: row.tenant_id,
            program_version_id: row.program_version_id,
            node_id: row.node_id,
            title: row.title.0,
            world_key: row.world_key,
            prerequisites: row.prerequisites,
            requirements: row.requirements.0,
            config: row.config.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// An audit chain entry. Immutable once written.
#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub actor_id: DbId,
    pub action: String,
    pub entity: String,
    pub entity_id: DbId,
    pub details: serde_json::Value,
    pub integrity_hash: String,
    pub at: Timestamp,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            tenant_id: row.tenant_id,
            actor_id: row.actor_id,
            action: row.action,
            entity: row.entity,
            entity_id: row.entity_id,
            details: row.details,
            integrity_hash: row.integrity_hash,
            at: row.at,
        }
    }
}
