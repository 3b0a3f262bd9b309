//! Audit logging for curriculum mutations.
//!
//! This module lives in `core` (zero internal deps) so both stores can
//! write entries in the same shape.

use serde::{Deserialize, Serialize};

use crate::hashing;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Action type constants
// ---------------------------------------------------------------------------

/// Known action types for audit log entries.
pub mod action_types {
    pub const PROGRAM_CREATE: &str = "program_create";
    pub const COURSE_CREATE: &str = "course_create";
    pub const DRAFT_CREATE: &str = "draft_create";
    pub const NODE_CREATE: &str = "node_create";
    pub const NODE_UPDATE: &str = "node_update";
    pub const NODE_DELETE: &str = "node_delete";
    pub const MAP_UPDATE: &str = "map_update";
    pub const PUBLISH: &str = "publish";
    pub const JOURNEY_RESET: &str = "journey_reset";
}

/// Entity names used in the `entity` column.
pub mod entities {
    pub const PROGRAM: &str = "program";
    pub const COURSE: &str = "course";
    pub const PROGRAM_VERSION: &str = "program_version";
    pub const BUILDER_NODE: &str = "builder_node";
    pub const USER: &str = "user";
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
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

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: DbId,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: DbId,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(actor_id: DbId, action: &'static str, entity: &'static str, entity_id: DbId) -> Self {
        Self {
            actor_id,
            action,
            entity,
            entity_id,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Canonical string the integrity hash is computed over.
    pub fn canonical(&self, at: Timestamp) -> String {
        canonical_fields(
            self.actor_id,
            self.action,
            self.entity,
            self.entity_id,
            &self.details,
            at,
        )
    }
}

fn canonical_fields(
    actor_id: DbId,
    action: &str,
    entity: &str,
    entity_id: DbId,
    details: &serde_json::Value,
    at: Timestamp,
) -> String {
    format!(
        "{actor_id}|{action}|{entity}|{entity_id}|{details}|{}",
        at.to_rfc3339()
    )
}

// ---------------------------------------------------------------------------
// Integrity hash computation
// ---------------------------------------------------------------------------

/// Known seed value for the first entry in a tenant's hash chain.
const CHAIN_SEED: &str = "CAMPUS_AUDIT_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit log entry.
///
/// `prev_hash` is the integrity_hash of the previous entry of the same
/// tenant, or `None` for the first entry.
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    hashing::chained_sha256_hex(&[prev_hash.unwrap_or(CHAIN_SEED), entry_data])
}

/// Verify a chain of entries in insertion order.
///
/// Returns the index of the first entry whose hash does not match.
pub fn verify_chain(entries: &[AuditEntry]) -> Option<usize> {
    let mut prev: Option<&str> = None;
    for (i, entry) in entries.iter().enumerate() {
        let data = canonical_fields(
            entry.actor_id,
            &entry.action,
            &entry.entity,
            entry.entity_id,
            &entry.details,
            entry.at,
        );
        if compute_integrity_hash(prev, &data) != entry.integrity_hash {
            return Some(i);
        }
        prev = Some(&entry.integrity_hash);
    }
    None
}
