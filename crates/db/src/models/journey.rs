//! Playbook version, node instance and history rows.

use campus_core::error::CoreError;
use campus_core::journey::model::{
    Decision, EventType, FormData, FormRevision, JourneyStateRow, NodeEvent, NodeInstance,
    NodeOutcome, UploadFulfilment,
};
use campus_core::journey::NodeState;
use campus_core::playbook::PlaybookVersion;
use campus_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use crate::error::corrupt;

fn parse_state(raw: &str) -> Result<NodeState, CoreError> {
    raw.parse().map_err(|_| corrupt("node state", raw))
}

// ---------------------------------------------------------------------------
// Playbook versions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct PlaybookVersionRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub version: String,
    pub checksum: String,
    pub raw_json: String,
    pub created_at: Timestamp,
}

impl From<PlaybookVersionRow> for PlaybookVersion {
    fn from(row: PlaybookVersionRow) -> Self {
        PlaybookVersion {
            id: row.id,
            tenant_id: row.tenant_id,
            version: row.version,
            checksum: row.checksum,
            raw_json: row.raw_json,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Instances, revisions, uploads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct NodeInstanceRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub node_id: String,
    pub playbook_version_id: DbId,
    pub state: String,
    pub current_rev: i32,
    pub state_entered_rev: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NodeInstanceRow> for NodeInstance {
    type Error = CoreError;

    fn try_from(row: NodeInstanceRow) -> Result<Self, Self::Error> {
        Ok(NodeInstance {
            state: parse_state(&row.state)?,
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            node_id: row.node_id,
            playbook_version_id: row.playbook_version_id,
            current_rev: row.current_rev,
            state_entered_rev: row.state_entered_rev,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FormRevisionRow {
    pub instance_id: DbId,
    pub rev: i32,
    /// Stored verbatim so the client's bytes round-trip exactly.
    pub form_data: String,
    pub edited_by: DbId,
    pub edited_at: Timestamp,
}

impl From<FormRevisionRow> for FormRevision {
    fn from(row: FormRevisionRow) -> Self {
        FormRevision {
            instance_id: row.instance_id,
            rev: row.rev,
            form_data: FormData::from_stored(row.form_data),
            edited_by: row.edited_by,
            edited_at: row.edited_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub instance_id: DbId,
    pub slot_key: String,
    pub document_id: DbId,
    pub uploaded_by: DbId,
    pub uploaded_at: Timestamp,
}

impl From<UploadRow> for UploadFulfilment {
    fn from(row: UploadRow) -> Self {
        UploadFulfilment {
            instance_id: row.instance_id,
            slot_key: row.slot_key,
            document_id: row.document_id,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Events, outcomes, projection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct NodeEventRow {
    pub id: DbId,
    pub instance_id: DbId,
    pub seq: i64,
    pub event_type: String,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub actor: DbId,
    pub payload: serde_json::Value,
    pub at: Timestamp,
}

impl TryFrom<NodeEventRow> for NodeEvent {
    type Error = CoreError;

    fn try_from(row: NodeEventRow) -> Result<Self, Self::Error> {
        let event_type: EventType = row
            .event_type
            .parse()
            .map_err(|_| corrupt("event type", &row.event_type))?;
        Ok(NodeEvent {
            id: row.id,
            instance_id: row.instance_id,
            seq: row.seq,
            event_type,
            from_state: row.from_state.as_deref().map(parse_state).transpose()?,
            to_state: row.to_state.as_deref().map(parse_state).transpose()?,
            actor: row.actor,
            payload: row.payload,
            at: row.at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NodeOutcomeRow {
    pub id: DbId,
    pub instance_id: DbId,
    pub decision: String,
    pub note: Option<String>,
    pub decided_by: DbId,
    pub decided_at: Timestamp,
}

impl TryFrom<NodeOutcomeRow> for NodeOutcome {
    type Error = CoreError;

    fn try_from(row: NodeOutcomeRow) -> Result<Self, Self::Error> {
        let decision =
            Decision::parse(&row.decision).ok_or_else(|| corrupt("decision", &row.decision))?;
        Ok(NodeOutcome {
            id: row.id,
            instance_id: row.instance_id,
            decision,
            note: row.note,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JourneyStateDbRow {
    pub user_id: DbId,
    pub node_id: String,
    pub state: String,
    pub updated_at: Timestamp,
}

impl TryFrom<JourneyStateDbRow> for JourneyStateRow {
    type Error = CoreError;

    fn try_from(row: JourneyStateDbRow) -> Result<Self, Self::Error> {
        Ok(JourneyStateRow {
            state: parse_state(&row.state)?,
            user_id: row.user_id,
            node_id: row.node_id,
            updated_at: row.updated_at,
        })
    }
}
