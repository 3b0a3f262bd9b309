//! Repository for the hash-chained `audit_log` table.

use campus_core::audit::NewAuditEntry;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::curriculum::AuditRow;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const COLUMNS: &str = "\
    id, tenant_id, actor_id, action, entity, entity_id, details, integrity_hash, at";

// ---------------------------------------------------------------------------
// AuditRepo
// ---------------------------------------------------------------------------

pub struct AuditRepo;

impl AuditRepo {
    /// Hash of the tenant's most recent entry. Caller holds the tenant's
    /// audit lock.
    pub async fn last_hash(conn: &mut PgConnection, tenant_id: DbId) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT integrity_hash FROM audit_log WHERE tenant_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        tenant_id: DbId,
        entry: &NewAuditEntry,
        integrity_hash: &str,
        at: Timestamp,
    ) -> Result<AuditRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_log (id, tenant_id, actor_id, action, entity, entity_id, details, integrity_hash, at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(entry.actor_id)
            .bind(entry.action)
            .bind(entry.entity)
            .bind(entry.entity_id)
            .bind(&entry.details)
            .bind(integrity_hash)
            .bind(at)
            .fetch_one(conn)
            .await
    }

    /// Most recent entries first.
    pub async fn list_recent(pool: &PgPool, tenant_id: DbId, limit: i64) -> Result<Vec<AuditRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log WHERE tenant_id = $1 ORDER BY seq DESC LIMIT $2"
        );
        sqlx::query_as::<_, AuditRow>(&query)
            .bind(tenant_id)
            .bind(limit.max(0))
            .fetch_all(pool)
            .await
    }
}
