//! Translation of driver errors into [`CoreError`].

use campus_core::error::CoreError;

/// Unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";
/// Foreign key violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// Check constraint violation.
const CHECK_VIOLATION: &str = "23514";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Map a sqlx error onto the domain error taxonomy.
///
/// Constraint violations become client errors; everything else is logged
/// and surfaced as an opaque storage failure.
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::RowNotFound => CoreError::not_found("row", "unknown"),
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => CoreError::Conflict {
                    message: format!("Duplicate value violates {constraint}"),
                    reason: Some("duplicate".into()),
                    offenders: Vec::new(),
                },
                Some(FOREIGN_KEY_VIOLATION) => {
                    CoreError::BadInput(format!("Referenced row does not exist ({constraint})"))
                }
                Some(CHECK_VIOLATION) => {
                    CoreError::BadInput(format!("Value violates {constraint}"))
                }
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                    CoreError::conflict("Concurrent update, retry the request")
                }
                _ => storage(err),
            }
        }
        _ => storage(err),
    }
}

fn storage(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Database error");
    CoreError::Storage(err.to_string())
}

/// Error for a persisted value that no longer parses into its domain type.
pub(crate) fn corrupt(what: &str, value: &str) -> CoreError {
    CoreError::Storage(format!("Unexpected {what} '{value}' in database"))
}
