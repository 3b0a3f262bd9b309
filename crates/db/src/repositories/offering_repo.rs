//! Repository for `course_offerings`, `course_staff` and `offering_cohorts`.

use campus_core::gradebook::EnrollmentStatus;
use campus_core::scheduling::model::{CourseStaff, NewOffering};
use campus_core::types::{new_id, DbId};
use sqlx::{PgExecutor, PgPool};

use crate::models::scheduling::{OfferingRow, StaffRow};

const COLUMNS: &str = "\
    id, tenant_id, term_id, course_id, section, delivery_format, capacity, \
    weekly_sessions, preferred_room_id, created_at";

const STAFF_COLUMNS: &str = "offering_id, user_id, role, is_primary";

pub struct OfferingRepo;

impl OfferingRepo {
    pub async fn create(pool: &PgPool, tenant_id: DbId, input: &NewOffering) -> Result<OfferingRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO course_offerings
                 (id, tenant_id, term_id, course_id, section, delivery_format, capacity,
                  weekly_sessions, preferred_room_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OfferingRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(input.term_id)
            .bind(input.course_id)
            .bind(&input.section)
            .bind(input.delivery_format().as_str())
            .bind(input.capacity)
            .bind(input.weekly_sessions())
            .bind(input.preferred_room_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<OfferingRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM course_offerings WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, OfferingRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Offerings ordered by id, optionally restricted to one term.
    pub async fn list<'e, E>(
        executor: E,
        tenant_id: DbId,
        term_id: Option<DbId>,
    ) -> Result<Vec<OfferingRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM course_offerings
             WHERE tenant_id = $1 AND ($2::uuid IS NULL OR term_id = $2)
             ORDER BY id"
        );
        sqlx::query_as::<_, OfferingRow>(&query)
            .bind(tenant_id)
            .bind(term_id)
            .fetch_all(executor)
            .await
    }

    pub async fn find_many<'e, E>(
        executor: E,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<OfferingRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM course_offerings WHERE tenant_id = $1 AND id = ANY($2) ORDER BY id"
        );
        sqlx::query_as::<_, OfferingRow>(&query)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Staff and cohort links
    // -----------------------------------------------------------------------

    /// Insert or replace the staff row of `(offering, user)`.
    pub async fn upsert_staff(pool: &PgPool, tenant_id: DbId, staff: &CourseStaff) -> Result<StaffRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO course_staff (offering_id, user_id, tenant_id, role, is_primary)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (offering_id, user_id) DO UPDATE
             SET role = EXCLUDED.role, is_primary = EXCLUDED.is_primary
             RETURNING {STAFF_COLUMNS}"
        );
        sqlx::query_as::<_, StaffRow>(&query)
            .bind(staff.offering_id)
            .bind(staff.user_id)
            .bind(tenant_id)
            .bind(staff.role.as_str())
            .bind(staff.is_primary)
            .fetch_one(pool)
            .await
    }

    pub async fn staff_for<'e, E>(executor: E, offering_ids: &[DbId]) -> Result<Vec<StaffRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {STAFF_COLUMNS} FROM course_staff WHERE offering_id = ANY($1) ORDER BY offering_id, user_id"
        );
        sqlx::query_as::<_, StaffRow>(&query)
            .bind(offering_ids)
            .fetch_all(executor)
            .await
    }

    /// Idempotent.
    pub async fn link_cohort(
        pool: &PgPool,
        tenant_id: DbId,
        offering_id: DbId,
        cohort_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO offering_cohorts (offering_id, cohort_id, tenant_id) VALUES ($1, $2, $3)
             ON CONFLICT (offering_id, cohort_id) DO NOTHING",
        )
        .bind(offering_id)
        .bind(cohort_id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// `(offering_id, cohort_id)` pairs for the given offerings.
    pub async fn cohorts_for<'e, E>(
        executor: E,
        offering_ids: &[DbId],
    ) -> Result<Vec<(DbId, DbId)>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, (DbId, DbId)>(
            "SELECT offering_id, cohort_id FROM offering_cohorts WHERE offering_id = ANY($1)",
        )
        .bind(offering_ids)
        .fetch_all(executor)
        .await
    }

    /// Non-dropped enrollment counts per offering. Offerings without
    /// enrollments are absent.
    pub async fn enrollment_counts<'e, E>(
        executor: E,
        offering_ids: &[DbId],
    ) -> Result<Vec<(DbId, i64)>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, (DbId, i64)>(
            "SELECT offering_id, COUNT(*) FROM enrollments
             WHERE offering_id = ANY($1) AND status <> $2
             GROUP BY offering_id",
        )
        .bind(offering_ids)
        .bind(EnrollmentStatus::Dropped.as_str())
        .fetch_all(executor)
        .await
    }
}
