//! Curriculum authoring: programs, courses and the journey-map builder.
//!
//! Only a program's draft version accepts node mutations. Publishing turns
//! the draft into an immutable playbook version (see [`build_playbook`]).

pub mod builder;

pub use builder::{ProgramBuilder, PublishOutcome};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::localized::Localized;
use crate::playbook::{NodeType, Requirements};
use crate::types::{DbId, Timestamp};

/// Locale every published title must carry.
pub const DEFAULT_LOCALE: &str = "en";

/// Field types accepted in form and checklist node configs.
pub const FIELD_TYPES: &[&str] = &["text", "textarea", "boolean", "date", "file", "note", "select"];

const MAX_NODE_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Programs and courses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: DbId,
    pub tenant_id: DbId,
    pub code: String,
    pub title: Localized,
    /// Latest published program version.
    pub active_version_id: Option<DbId>,
    /// Playbook version new journeys of this program start on.
    pub active_playbook_version_id: Option<DbId>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProgram {
    pub code: String,
    pub title: Localized,
}

impl NewProgram {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_code(&self.code, "Program")?;
        if self.title.0.values().all(|t| t.trim().is_empty()) {
            return Err(CoreError::BadInput("Program title is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_id: Option<DbId>,
    pub code: String,
    pub title: Localized,
    pub credits: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    #[serde(default)]
    pub program_id: Option<DbId>,
    pub code: String,
    pub title: Localized,
    pub credits: i32,
}

impl NewCourse {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_code(&self.code, "Course")?;
        if !(0..=60).contains(&self.credits) {
            return Err(CoreError::BadInput("Course credits must be between 0 and 60".into()));
        }
        Ok(())
    }
}

fn validate_code(code: &str, what: &str) -> Result<(), CoreError> {
    let code = code.trim();
    if code.is_empty() || code.len() > 32 {
        return Err(CoreError::BadInput(format!("{what} code must be 1-32 characters")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Versions and builder nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Published,
}

impl VersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramVersion {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_id: DbId,
    pub number: i32,
    pub status: VersionStatus,
    pub playbook_version_id: Option<DbId>,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

/// Typed authoring config of a builder node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Localized>,
    /// Form fields, or checklist items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub label: Localized,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub title: Localized,
    #[serde(default)]
    pub body: Localized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderNode {
    pub id: DbId,
    pub tenant_id: DbId,
    pub program_version_id: DbId,
    pub node_id: String,
    pub node_type: NodeType,
    pub title: Localized,
    pub world_key: String,
    pub prerequisites: Vec<String>,
    pub requirements: Requirements,
    pub config: NodeConfig,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Create/update body for a builder node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeInput {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: Localized,
    pub world_key: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub config: NodeConfig,
}

impl NodeInput {
    /// Shape and type/config validation. Cross-node checks (edges, cycles,
    /// locale completeness) run at publish.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_node_id(&self.node_id)?;
        if self.world_key.trim().is_empty() {
            return Err(CoreError::BadInput("world_key is required".into()));
        }
        if self.title.0.values().all(|t| t.trim().is_empty()) {
            return Err(CoreError::BadInput(format!("Node '{}' needs a title", self.node_id)));
        }
        if self.prerequisites.iter().any(|p| p == &self.node_id) {
            return Err(CoreError::BadInput(format!(
                "Node '{}' cannot be its own prerequisite",
                self.node_id
            )));
        }
        validate_config(self.node_type, &self.config, &self.requirements)
    }
}

fn validate_node_id(id: &str) -> Result<(), CoreError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_NODE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(CoreError::BadInput(format!(
            "Invalid node id '{id}': use up to {MAX_NODE_ID_LEN} letters, digits, '_' or '-'"
        )))
    }
}

/// Validate a node's config against its type.
pub fn validate_config(
    node_type: NodeType,
    config: &NodeConfig,
    requirements: &Requirements,
) -> Result<(), CoreError> {
    match node_type {
        NodeType::Form => {
            if config.fields.is_empty() {
                return Err(CoreError::BadInput("A form node needs at least one field".into()));
            }
            for field in &config.fields {
                validate_field(field)?;
            }
        }
        NodeType::Checklist => {
            if config.fields.is_empty() {
                return Err(CoreError::BadInput("A checklist needs at least one item".into()));
            }
        }
        NodeType::Cards => {
            if config.slides.is_empty() {
                return Err(CoreError::BadInput("A cards node needs at least one slide".into()));
            }
        }
        NodeType::Upload => {
            if requirements.uploads.is_empty() {
                return Err(CoreError::BadInput("An upload node needs at least one slot".into()));
            }
        }
        NodeType::Info | NodeType::ConfirmTask => {}
        NodeType::Other => {
            return Err(CoreError::BadInput("Unknown node type".into()));
        }
    }
    let mut keys = BTreeSet::new();
    for slot in &requirements.uploads {
        if slot.key.trim().is_empty() || !keys.insert(slot.key.as_str()) {
            return Err(CoreError::BadInput(format!(
                "Upload slot keys must be unique and non-empty ('{}')",
                slot.key
            )));
        }
    }
    Ok(())
}

fn validate_field(field: &FieldSpec) -> Result<(), CoreError> {
    if field.key.trim().is_empty() {
        return Err(CoreError::BadInput("Field key is required".into()));
    }
    if !FIELD_TYPES.contains(&field.field_type.as_str()) {
        return Err(CoreError::BadInput(format!(
            "Unknown field type '{}'. Must be one of: {}",
            field.field_type,
            FIELD_TYPES.join(", ")
        )));
    }
    if field.field_type == "select" && field.options.is_empty() {
        return Err(CoreError::BadInput(format!(
            "Select field '{}' needs options",
            field.key
        )));
    }
    Ok(())
}

/// A prerequisite edge: `from` must be done before `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Nodes and edges of one program version, as the builder UI draws them.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderMap {
    pub version: Option<ProgramVersion>,
    pub nodes: Vec<BuilderNode>,
    pub edges: Vec<Edge>,
}

impl BuilderMap {
    pub fn new(version: Option<ProgramVersion>, nodes: Vec<BuilderNode>) -> Self {
        let mut edges: Vec<Edge> = nodes
            .iter()
            .flat_map(|n| {
                n.prerequisites.iter().map(move |p| Edge {
                    from: p.clone(),
                    to: n.node_id.clone(),
                })
            })
            .collect();
        edges.sort();
        Self { version, nodes, edges }
    }
}

/// Convert an edge list into the prerequisite list of every node.
///
/// Fails when an edge references an unknown node or is a self-loop.
pub fn edges_to_prerequisites(
    node_ids: &BTreeSet<String>,
    edges: &[Edge],
) -> Result<BTreeMap<String, Vec<String>>, CoreError> {
    let mut prereqs: BTreeMap<String, Vec<String>> =
        node_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
    for edge in edges {
        if edge.from == edge.to {
            return Err(CoreError::BadInput(format!("Self edge on '{}'", edge.from)));
        }
        for end in [&edge.from, &edge.to] {
            if !node_ids.contains(end) {
                return Err(CoreError::not_found("builder_node", end));
            }
        }
        let list = prereqs.entry(edge.to.clone()).or_default();
        if !list.contains(&edge.from) {
            list.push(edge.from.clone());
        }
    }
    for list in prereqs.values_mut() {
        list.sort();
    }
    Ok(prereqs)
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Node ids in topological order, ties broken by id.
fn topological_ids(nodes: &[BuilderNode]) -> Result<Vec<&BuilderNode>, CoreError> {
    let by_id: BTreeMap<&str, &BuilderNode> = nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();
    let mut indegree: BTreeMap<&str, usize> = by_id.keys().map(|k| (*k, 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in nodes {
        for p in &node.prerequisites {
            if !by_id.contains_key(p.as_str()) {
                return Err(CoreError::BadCatalogue(format!(
                    "Node '{}' depends on unknown node '{p}'",
                    node.node_id
                )));
            }
            if let Some(d) = indegree.get_mut(node.node_id.as_str()) {
                *d += 1;
            }
            dependents.entry(p.as_str()).or_default().push(node.node_id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree.iter().filter(|(_, d)| **d == 0).map(|(k, _)| *k).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_first() {
        order.push(by_id[id]);
        for dep in dependents.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(d) = indegree.get_mut(dep) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*dep);
                }
            }
        }
    }
    if order.len() != nodes.len() {
        let mut stuck: Vec<&str> = indegree.iter().filter(|(_, d)| **d > 0).map(|(k, _)| *k).collect();
        stuck.sort_unstable();
        return Err(CoreError::BadCatalogue(format!(
            "Prerequisite cycle among: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// Build the playbook JSON for a program version.
///
/// Worlds appear in the order their first node appears topologically;
/// nodes inside a world keep topological-then-id order.
pub fn build_playbook(
    program: &Program,
    version_number: i32,
    nodes: &[BuilderNode],
) -> Result<String, CoreError> {
    if nodes.is_empty() {
        return Err(CoreError::BadCatalogue("Cannot publish an empty journey map".into()));
    }
    let ordered = topological_ids(nodes)?;

    let mut world_order: Vec<&str> = Vec::new();
    let mut worlds: BTreeMap<&str, Vec<serde_json::Value>> = BTreeMap::new();
    for node in ordered {
        if !node.title.has(DEFAULT_LOCALE) {
            return Err(CoreError::BadCatalogue(format!(
                "Node '{}' has no '{DEFAULT_LOCALE}' title",
                node.node_id
            )));
        }
        let key = node.world_key.as_str();
        if !worlds.contains_key(key) {
            world_order.push(key);
        }
        let mut prerequisites = node.prerequisites.clone();
        prerequisites.sort();
        worlds.entry(key).or_default().push(serde_json::json!({
            "id": node.node_id,
            "type": node.node_type,
            "title": node.title,
            "prerequisites": prerequisites,
            "requirements": node.requirements,
            "config": node.config,
        }));
    }

    let worlds: Vec<serde_json::Value> = world_order
        .into_iter()
        .map(|key| {
            serde_json::json!({
                "id": key,
                "nodes": worlds.remove(key).unwrap_or_default(),
            })
        })
        .collect();
    let doc = serde_json::json!({
        "playbook_id": program.code,
        "version": format!("{}.{}", program.code, version_number),
        "locale_default": DEFAULT_LOCALE,
        "worlds": worlds,
    });
    serde_json::to_string(&doc).map_err(|e| CoreError::BadCatalogue(e.to_string()))
}
