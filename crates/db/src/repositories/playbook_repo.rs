//! Repository for `playbook_versions` and `tenant_active_playbook`.

use campus_core::playbook::NewPlaybookVersion;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::journey::PlaybookVersionRow;

const COLUMNS: &str = "id, tenant_id, version, checksum, raw_json, created_at";

pub struct PlaybookVersionRepo;

impl PlaybookVersionRepo {
    pub async fn insert<'e, E>(
        executor: E,
        tenant_id: DbId,
        input: &NewPlaybookVersion,
        at: Timestamp,
    ) -> Result<PlaybookVersionRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO playbook_versions (id, tenant_id, version, checksum, raw_json, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PlaybookVersionRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(&input.version)
            .bind(&input.checksum)
            .bind(&input.raw_json)
            .bind(at)
            .fetch_one(executor)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<PlaybookVersionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM playbook_versions WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, PlaybookVersionRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Point the tenant default at `version_id`.
    pub async fn activate(pool: &PgPool, tenant_id: DbId, version_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tenant_active_playbook (tenant_id, playbook_version_id, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (tenant_id) DO UPDATE
             SET playbook_version_id = EXCLUDED.playbook_version_id, updated_at = now()",
        )
        .bind(tenant_id)
        .bind(version_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn active_for_tenant(pool: &PgPool, tenant_id: DbId) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT playbook_version_id FROM tenant_active_playbook WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }
}
