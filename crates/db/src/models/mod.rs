//! Database row structs.
//!
//! Each submodule contains `FromRow` structs matching table rows and the
//! conversions into `campus_core` domain types. Enum columns are stored as
//! text and parsed here; a value that no longer parses is a storage error.

pub mod curriculum;
pub mod gradebook;
pub mod journey;
pub mod scheduling;
pub mod tenancy;
