//! [`PgStore`]: the Postgres implementation of the `campus_core` store
//! traits.
//!
//! Multi-statement units run in one transaction. Per-instance sequences
//! are serialized by a row lock on `node_instances`; per-tenant sequences
//! (audit chain, session batches) by a transaction-scoped advisory lock.

mod curriculum;
mod gradebook;
mod identity;
mod journey;
mod scheduling;

use campus_core::error::{CoreError, CoreResult};
use campus_core::types::DbId;
use sqlx::PgPool;

use crate::error::map_db_error;
use crate::repositories::exists_in_tenant;

/// Store backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `NotFound` unless `table` holds `id` within the tenant.
    async fn require(&self, table: &'static str, entity: &'static str, tenant_id: DbId, id: DbId) -> CoreResult<()> {
        if exists_in_tenant(&self.pool, table, tenant_id, id)
            .await
            .map_err(map_db_error)?
        {
            Ok(())
        } else {
            Err(CoreError::not_found(entity, id))
        }
    }
}

/// Convert rows whose domain conversion can fail.
fn try_convert<R, T>(rows: Vec<R>) -> CoreResult<Vec<T>>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
