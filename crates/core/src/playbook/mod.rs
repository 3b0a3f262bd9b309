//! Versioned, immutable playbook catalogues.
//!
//! A playbook version is persisted as raw JSON. [`Catalogue::load`] parses
//! and validates it once; the result is shared read-only through
//! [`CatalogueCache`].

pub mod cache;
pub mod catalogue;
pub mod definition;

pub use cache::CatalogueCache;
pub use catalogue::{checksum, Catalogue};
pub use definition::{NodeDefinition, NodeType, PlaybookDefinition, Requirements, UploadSlot, WorldDefinition};

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// A persisted playbook version. `raw_json` holds the exact bytes the
/// checksum was computed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookVersion {
    pub id: DbId,
    pub tenant_id: DbId,
    pub version: String,
    pub checksum: String,
    pub raw_json: String,
    pub created_at: Timestamp,
}

/// Input for persisting a new playbook version.
#[derive(Debug, Clone)]
pub struct NewPlaybookVersion {
    pub version: String,
    pub checksum: String,
    pub raw_json: String,
}

impl NewPlaybookVersion {
    /// Validate `raw_json` as a catalogue and compute its checksum.
    pub fn from_raw(raw_json: String) -> Result<Self, crate::error::CoreError> {
        let def = definition::PlaybookDefinition::parse(raw_json.as_bytes())?;
        // Full validation up front; a version that cannot load is never stored.
        Catalogue::from_definition(DbId::nil(), def.clone())?;
        Ok(Self {
            version: def.version,
            checksum: checksum(raw_json.as_bytes()),
            raw_json,
        })
    }
}
