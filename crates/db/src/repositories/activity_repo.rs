//! Repository for the append-only `activity_logs` table.

use campus_core::types::{DbId, Timestamp};
use sqlx::PgPool;

/// Fields of one bus event as persisted.
pub struct CreateActivity<'a> {
    pub tenant_id: Option<DbId>,
    pub event_type: &'a str,
    pub source_entity_type: Option<&'a str>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub correlation_id: Option<&'a str>,
    pub payload: &'a serde_json::Value,
    pub occurred_at: Timestamp,
}

pub struct ActivityRepo;

impl ActivityRepo {
    /// Insert one row, returning its id.
    pub async fn insert(pool: &PgPool, input: &CreateActivity<'_>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO activity_logs
                 (tenant_id, event_type, source_entity_type, source_entity_id,
                  actor_user_id, correlation_id, payload, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(input.tenant_id)
        .bind(input.event_type)
        .bind(input.source_entity_type)
        .bind(input.source_entity_id)
        .bind(input.actor_user_id)
        .bind(input.correlation_id)
        .bind(input.payload)
        .bind(input.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// Event types recorded under one request, oldest first.
    pub async fn event_types_for_correlation(
        pool: &PgPool,
        correlation_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT event_type FROM activity_logs WHERE correlation_id = $1 ORDER BY id",
        )
        .bind(correlation_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_tenant(pool: &PgPool, tenant_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activity_logs WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(pool)
            .await
    }
}
