//! Repository for the `class_sessions` table.

use campus_core::scheduling::model::{NewSession, SessionFilter};
use campus_core::types::{new_id, DbId, Timestamp};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::scheduling::SessionRow;

const COLUMNS: &str = "\
    id, tenant_id, offering_id, date, start_time, end_time, room_id, session_type, created_at";

pub struct SessionRepo;

impl SessionRepo {
    pub async fn list(pool: &PgPool, tenant_id: DbId, filter: &SessionFilter) -> Result<Vec<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM class_sessions
             WHERE tenant_id = $1
               AND ($2::uuid IS NULL OR offering_id = $2)
               AND ($3::date IS NULL OR date >= $3)
               AND ($4::date IS NULL OR date <= $4)
             ORDER BY date, start_time, id"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(tenant_id)
            .bind(filter.offering_id)
            .bind(filter.start)
            .bind(filter.end)
            .fetch_all(pool)
            .await
    }

    /// Sessions dated within `[start, end]`.
    pub async fn in_range<'e, E>(
        executor: E,
        tenant_id: DbId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SessionRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM class_sessions
             WHERE tenant_id = $1 AND date BETWEEN $2 AND $3
             ORDER BY date, start_time, id"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(tenant_id)
            .bind(start)
            .bind(end)
            .fetch_all(executor)
            .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        tenant_id: DbId,
        proposal: &NewSession,
        at: Timestamp,
    ) -> Result<SessionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO class_sessions
                 (id, tenant_id, offering_id, date, start_time, end_time, room_id, session_type, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(proposal.offering_id)
            .bind(proposal.date)
            .bind(proposal.start_time)
            .bind(proposal.end_time)
            .bind(proposal.room_id)
            .bind(proposal.session_type.as_str())
            .bind(at)
            .fetch_one(conn)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM class_sessions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
