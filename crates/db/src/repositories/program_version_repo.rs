//! Repository for the `program_versions` table.

use campus_core::curriculum::VersionStatus;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::curriculum::ProgramVersionRow;

const COLUMNS: &str = "\
    id, tenant_id, program_id, number, status, playbook_version_id, created_at, published_at";

pub struct ProgramVersionRepo;

impl ProgramVersionRepo {
    pub async fn find_draft(
        pool: &PgPool,
        tenant_id: DbId,
        program_id: DbId,
    ) -> Result<Option<ProgramVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM program_versions
             WHERE program_id = $1 AND tenant_id = $2 AND status = $3"
        );
        sqlx::query_as::<_, ProgramVersionRow>(&query)
            .bind(program_id)
            .bind(tenant_id)
            .bind(VersionStatus::Draft.as_str())
            .fetch_optional(pool)
            .await
    }

    pub async fn latest_published(
        pool: &PgPool,
        tenant_id: DbId,
        program_id: DbId,
    ) -> Result<Option<ProgramVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM program_versions
             WHERE program_id = $1 AND tenant_id = $2 AND status = $3
             ORDER BY number DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, ProgramVersionRow>(&query)
            .bind(program_id)
            .bind(tenant_id)
            .bind(VersionStatus::Published.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Insert a draft numbered after the program's latest version.
    ///
    /// The partial unique index on drafts rejects a second concurrent draft.
    pub async fn insert_draft(
        conn: &mut PgConnection,
        tenant_id: DbId,
        program_id: DbId,
        at: Timestamp,
    ) -> Result<ProgramVersionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO program_versions (id, tenant_id, program_id, number, status, created_at)
             SELECT $1, $2, $3, COALESCE(MAX(number), 0) + 1, $4, $5
             FROM program_versions WHERE program_id = $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProgramVersionRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(program_id)
            .bind(VersionStatus::Draft.as_str())
            .bind(at)
            .fetch_one(conn)
            .await
    }

    /// Lock the version row for a publish.
    pub async fn lock(
        conn: &mut PgConnection,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<ProgramVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM program_versions WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, ProgramVersionRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn mark_published(
        conn: &mut PgConnection,
        id: DbId,
        playbook_version_id: DbId,
        at: Timestamp,
    ) -> Result<ProgramVersionRow, sqlx::Error> {
        let query = format!(
            "UPDATE program_versions
             SET status = $2, playbook_version_id = $3, published_at = $4
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProgramVersionRow>(&query)
            .bind(id)
            .bind(VersionStatus::Published.as_str())
            .bind(playbook_version_id)
            .bind(at)
            .fetch_one(conn)
            .await
    }
}
