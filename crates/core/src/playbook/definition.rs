use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::localized::Localized;

fn default_locale() -> String {
    "en".to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// Raw playbook document as persisted in `playbook_versions.raw_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookDefinition {
    pub playbook_id: String,
    pub version: String,
    #[serde(default = "default_locale")]
    pub locale_default: String,
    pub worlds: Vec<WorldDefinition>,
}

impl PlaybookDefinition {
    pub fn parse(raw: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(raw)
            .map_err(|e| CoreError::BadCatalogue(format!("Malformed playbook JSON: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Localized::is_empty")]
    pub title: Localized,
    /// Completed nodes in this world earn scoreboard XP.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub scored: bool,
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Form,
    ConfirmTask,
    Info,
    Upload,
    Checklist,
    Cards,
    #[serde(other)]
    Other,
}

impl NodeType {
    /// Node types whose submission is form data; these need at least one
    /// saved revision before they can be submitted.
    pub fn requires_form(self) -> bool {
        matches!(self, Self::Form | Self::Checklist)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::ConfirmTask => "confirmTask",
            Self::Info => "info",
            Self::Upload => "upload",
            Self::Checklist => "checklist",
            Self::Cards => "cards",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: Localized,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
}

impl NodeDefinition {
    pub fn upload_slot(&self, key: &str) -> Option<&UploadSlot> {
        self.requirements.uploads.iter().find(|s| s.key == key)
    }

    pub fn required_slots(&self) -> impl Iterator<Item = &UploadSlot> {
        self.requirements.uploads.iter().filter(|s| s.required)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<UploadSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<serde_json::Value>,
    /// The node is verified by an external system after submission.
    #[serde(default, skip_serializing_if = "is_false")]
    pub external_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSlot {
    pub key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub label: Localized,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mime: Vec<String>,
}
