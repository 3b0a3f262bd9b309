//! Shared query parameter types for API handlers.

use campus_core::types::DbId;
use serde::Deserialize;

/// `?since=` for event feeds: only events with a greater sequence number.
#[derive(Debug, Deserialize)]
pub struct SinceParams {
    pub since: Option<i64>,
}

/// `?term_id=` for offering listings.
#[derive(Debug, Deserialize)]
pub struct TermParams {
    pub term_id: Option<DbId>,
}
