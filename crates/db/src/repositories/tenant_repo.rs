//! Repository for the `tenants` table.

use campus_core::tenancy::NewTenant;
use campus_core::types::{new_id, DbId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::tenancy::TenantRow;

/// Column list for `tenants` SELECT queries.
const COLUMNS: &str = "id, slug, name, tenant_type, enabled_services, active, created_at";

/// Provides create, lookup and soft-delete operations for tenants.
pub struct TenantRepo;

impl TenantRepo {
    /// Insert a new tenant. A taken slug surfaces as a unique violation.
    pub async fn create(pool: &PgPool, input: &NewTenant) -> Result<TenantRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (id, slug, name, tenant_type, enabled_services)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TenantRow>(&query)
            .bind(new_id())
            .bind(&input.slug)
            .bind(&input.name)
            .bind(input.tenant_type.as_str())
            .bind(Json(&input.enabled_services))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TenantRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants WHERE id = $1");
        sqlx::query_as::<_, TenantRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark an active tenant inactive. Returns `false` if none matched.
    pub async fn deactivate(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET active = false WHERE id = $1 AND active")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
