//! Repository for the `enrollments` table.

use campus_core::gradebook::EnrollmentStatus;
use campus_core::types::DbId;
use sqlx::PgPool;

use crate::models::gradebook::EnrollmentRow;

const COLUMNS: &str = "tenant_id, offering_id, student_id, status, enrolled_at";

pub struct EnrollmentRepo;

impl EnrollmentRepo {
    /// Enroll, or re-activate a dropped enrollment.
    pub async fn upsert_active(
        pool: &PgPool,
        tenant_id: DbId,
        offering_id: DbId,
        student_id: DbId,
    ) -> Result<EnrollmentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO enrollments (tenant_id, offering_id, student_id, status)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (offering_id, student_id) DO UPDATE SET status = EXCLUDED.status
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EnrollmentRow>(&query)
            .bind(tenant_id)
            .bind(offering_id)
            .bind(student_id)
            .bind(EnrollmentStatus::Active.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_offering(
        pool: &PgPool,
        tenant_id: DbId,
        offering_id: DbId,
    ) -> Result<Vec<EnrollmentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM enrollments
             WHERE tenant_id = $1 AND offering_id = $2
             ORDER BY enrolled_at, student_id"
        );
        sqlx::query_as::<_, EnrollmentRow>(&query)
            .bind(tenant_id)
            .bind(offering_id)
            .fetch_all(pool)
            .await
    }
}
