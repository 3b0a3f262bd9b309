use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::journey::state::NodeState;
use crate::types::{DbId, Timestamp};

/// Maximum accepted size of one form revision.
pub const MAX_FORM_BYTES: usize = 256 * 1024;

/// Opaque JSON form payload.
///
/// Parsed once at ingress to prove it is a JSON object, then carried as the
/// exact bytes received so a later read returns them unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct FormData(Arc<str>);

impl FormData {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.len() > MAX_FORM_BYTES {
            return Err(CoreError::BadInput(format!(
                "form_data exceeds {MAX_FORM_BYTES} bytes"
            )));
        }
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| CoreError::BadInput(format!("form_data is not valid JSON: {e}")))?;
        if !value.is_object() {
            return Err(CoreError::BadInput("form_data must be a JSON object".into()));
        }
        Ok(Self(Arc::from(raw)))
    }

    /// Wrap bytes already validated on the way in (store reads).
    pub fn from_stored(raw: String) -> Self {
        Self(Arc::from(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FormData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormData({} bytes)", self.0.len())
    }
}

impl Serialize for FormData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = serde_json::value::RawValue::from_string(self.0.to_string())
            .map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<serde_json::value::RawValue>::deserialize(deserializer)?;
        FormData::parse(raw.get()).map_err(serde::de::Error::custom)
    }
}

/// Unique key of a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub node_id: String,
    pub playbook_version_id: DbId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub node_id: String,
    pub playbook_version_id: DbId,
    pub state: NodeState,
    pub current_rev: i32,
    /// `current_rev` at the moment the current state was entered.
    pub state_entered_rev: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormRevision {
    pub instance_id: DbId,
    pub rev: i32,
    pub form_data: FormData,
    pub edited_by: DbId,
    pub edited_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFulfilment {
    pub instance_id: DbId,
    pub slot_key: String,
    pub document_id: DbId,
    pub uploaded_by: DbId,
    pub uploaded_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

pub const EVENT_CREATED: &str = "created";
pub const EVENT_STATE_CHANGED: &str = "state_changed";
pub const EVENT_FORM_SAVED: &str = "form_saved";
pub const EVENT_UPLOAD_ATTACHED: &str = "upload_attached";
pub const EVENT_COMMENT_ADDED: &str = "comment_added";
pub const EVENT_OUTCOME_RECORDED: &str = "outcome_recorded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    StateChanged,
    FormSaved,
    UploadAttached,
    CommentAdded,
    OutcomeRecorded,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => EVENT_CREATED,
            Self::StateChanged => EVENT_STATE_CHANGED,
            Self::FormSaved => EVENT_FORM_SAVED,
            Self::UploadAttached => EVENT_UPLOAD_ATTACHED,
            Self::CommentAdded => EVENT_COMMENT_ADDED,
            Self::OutcomeRecorded => EVENT_OUTCOME_RECORDED,
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            EVENT_CREATED => Ok(Self::Created),
            EVENT_STATE_CHANGED => Ok(Self::StateChanged),
            EVENT_FORM_SAVED => Ok(Self::FormSaved),
            EVENT_UPLOAD_ATTACHED => Ok(Self::UploadAttached),
            EVENT_COMMENT_ADDED => Ok(Self::CommentAdded),
            EVENT_OUTCOME_RECORDED => Ok(Self::OutcomeRecorded),
            other => Err(format!("Unknown node event type '{other}'")),
        }
    }
}

/// An append-only entry of an instance's event log. `seq` is dense and
/// starts at 1 per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub id: DbId,
    pub instance_id: DbId,
    pub seq: i64,
    pub event_type: EventType,
    pub from_state: Option<NodeState>,
    pub to_state: Option<NodeState>,
    pub actor: DbId,
    pub payload: serde_json::Value,
    pub at: Timestamp,
}

/// A free-standing event appended outside of a state change.
#[derive(Debug, Clone)]
pub struct NewNodeEvent {
    pub event_type: EventType,
    pub actor: DbId,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Projection and outcomes
// ---------------------------------------------------------------------------

/// Denormalized latest state of a node for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStateRow {
    pub user_id: DbId,
    pub node_id: String,
    pub state: NodeState,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Reviewer decision recorded alongside `submitted -> done|needs_fixes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub id: DbId,
    pub instance_id: DbId,
    pub decision: Decision,
    pub note: Option<String>,
    pub decided_by: DbId,
    pub decided_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Transition unit of work
// ---------------------------------------------------------------------------

/// Everything a store commits atomically for one transition: the CAS on
/// the instance state, the projection upsert, the `state_changed` event and
/// (for reviewer decisions) the outcome row.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub tenant_id: DbId,
    pub instance_id: DbId,
    pub user_id: DbId,
    pub node_id: String,
    pub from: NodeState,
    pub to: NodeState,
    pub actor: DbId,
    pub payload: serde_json::Value,
    pub outcome: Option<(Decision, Option<String>)>,
    pub at: Timestamp,
}
