//! Repository for the `availability_windows` table.

use campus_core::scheduling::model::NewAvailability;
use campus_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::scheduling::{weekday_index, AvailabilityRow};

const COLUMNS: &str = "id, tenant_id, user_id, weekday, start_time, end_time, is_unavailable";

pub struct AvailabilityRepo;

impl AvailabilityRepo {
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        input: &NewAvailability,
    ) -> Result<AvailabilityRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO availability_windows (id, tenant_id, user_id, weekday, start_time, end_time, is_unavailable)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AvailabilityRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(input.user_id)
            .bind(weekday_index(input.weekday))
            .bind(input.start_time)
            .bind(input.end_time)
            .bind(input.is_unavailable)
            .fetch_one(pool)
            .await
    }

    pub async fn list(pool: &PgPool, tenant_id: DbId) -> Result<Vec<AvailabilityRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_windows
             WHERE tenant_id = $1
             ORDER BY user_id, weekday, start_time"
        );
        sqlx::query_as::<_, AvailabilityRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}
