//! Repository layer: one zero-sized struct per table group.
//!
//! Repositories return row structs from [`crate::models`] and raw
//! `sqlx::Error`s; [`crate::store::PgStore`] converts both into domain
//! types. Functions that must run inside a caller's transaction take
//! `&mut PgConnection`; read-only lookups accept any executor.

pub mod activity_repo;
pub mod audit_repo;
pub mod availability_repo;
pub mod builder_node_repo;
pub mod enrollment_repo;
pub mod grade_repo;
pub mod instance_repo;
pub mod node_event_repo;
pub mod offering_repo;
pub mod playbook_repo;
pub mod program_repo;
pub mod program_version_repo;
pub mod reference_repo;
pub mod session_repo;
pub mod tenant_repo;
pub mod user_repo;

pub use activity_repo::{ActivityRepo, CreateActivity};
pub use audit_repo::AuditRepo;
pub use availability_repo::AvailabilityRepo;
pub use builder_node_repo::BuilderNodeRepo;
pub use enrollment_repo::EnrollmentRepo;
pub use grade_repo::GradeRepo;
pub use instance_repo::NodeInstanceRepo;
pub use node_event_repo::NodeEventRepo;
pub use offering_repo::OfferingRepo;
pub use playbook_repo::PlaybookVersionRepo;
pub use program_repo::ProgramRepo;
pub use program_version_repo::ProgramVersionRepo;
pub use reference_repo::ReferenceRepo;
pub use session_repo::SessionRepo;
pub use tenant_repo::TenantRepo;
pub use user_repo::UserRepo;

use campus_core::types::DbId;
use sqlx::PgExecutor;

/// Whether `table` holds a row with `id` owned by `tenant_id`.
///
/// `table` must be a trusted identifier; it is interpolated verbatim.
pub async fn exists_in_tenant<'e, E>(
    executor: E,
    table: &'static str,
    tenant_id: DbId,
    id: DbId,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1 AND tenant_id = $2)");
    sqlx::query_scalar::<_, bool>(&query)
        .bind(id)
        .bind(tenant_id)
        .fetch_one(executor)
        .await
}

/// Take a transaction-scoped advisory lock on `key`.
///
/// Used to serialize per-tenant sequences (audit chain, session batches)
/// without a dedicated lock table.
pub async fn advisory_xact_lock(
    conn: &mut sqlx::PgConnection,
    key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}
