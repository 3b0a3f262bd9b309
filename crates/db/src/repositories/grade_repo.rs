//! Repository for `activities`, `gradebook_entries` and `grading_schemas`.

use campus_core::gradebook::{GradingSchema, NewActivity, NewGrade};
use campus_core::types::{new_id, DbId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::gradebook::{ActivityRow, GradeRecordRow, GradebookEntryRow, GradingSchemaRow};

const ACTIVITY_COLUMNS: &str = "id, tenant_id, offering_id, title, max_score, weight, created_at";

const ENTRY_COLUMNS: &str = "\
    id, tenant_id, offering_id, activity_id, student_id, score, max_score, grade, graded_by, graded_at";

pub struct GradeRepo;

impl GradeRepo {
    // -----------------------------------------------------------------------
    // Activities
    // -----------------------------------------------------------------------

    pub async fn create_activity(
        pool: &PgPool,
        tenant_id: DbId,
        offering_id: DbId,
        input: &NewActivity,
    ) -> Result<ActivityRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO activities (id, tenant_id, offering_id, title, max_score, weight)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ACTIVITY_COLUMNS}"
        );
        sqlx::query_as::<_, ActivityRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(offering_id)
            .bind(&input.title)
            .bind(input.max_score)
            .bind(input.weight)
            .fetch_one(pool)
            .await
    }

    pub async fn find_activity(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<ActivityRow>, sqlx::Error> {
        let query = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, ActivityRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Gradebook entries
    // -----------------------------------------------------------------------

    /// Insert or replace the entry of `(activity, student)`.
    pub async fn upsert_entry(pool: &PgPool, tenant_id: DbId, input: &NewGrade) -> Result<GradebookEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO gradebook_entries
                 (id, tenant_id, offering_id, activity_id, student_id, score, max_score, grade, graded_by, graded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT ON CONSTRAINT uq_gradebook_entries_student DO UPDATE
             SET score = EXCLUDED.score, max_score = EXCLUDED.max_score, grade = EXCLUDED.grade,
                 graded_by = EXCLUDED.graded_by, graded_at = EXCLUDED.graded_at
             RETURNING {ENTRY_COLUMNS}"
        );
        sqlx::query_as::<_, GradebookEntryRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(input.offering_id)
            .bind(input.activity_id)
            .bind(input.student_id)
            .bind(input.score)
            .bind(input.max_score)
            .bind(&input.grade)
            .bind(input.graded_by)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_offering(
        pool: &PgPool,
        tenant_id: DbId,
        offering_id: DbId,
    ) -> Result<Vec<GradebookEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM gradebook_entries
             WHERE tenant_id = $1 AND offering_id = $2
             ORDER BY student_id, activity_id"
        );
        sqlx::query_as::<_, GradebookEntryRow>(&query)
            .bind(tenant_id)
            .bind(offering_id)
            .fetch_all(pool)
            .await
    }

    pub async fn student_records(
        pool: &PgPool,
        tenant_id: DbId,
        student_id: DbId,
    ) -> Result<Vec<GradeRecordRow>, sqlx::Error> {
        sqlx::query_as::<_, GradeRecordRow>(
            "SELECT g.offering_id, c.credits, t.is_closed AS term_closed, g.score, g.max_score
             FROM gradebook_entries g
             JOIN course_offerings o ON o.id = g.offering_id
             JOIN courses c ON c.id = o.course_id
             JOIN academic_terms t ON t.id = o.term_id
             WHERE g.tenant_id = $1 AND g.student_id = $2
             ORDER BY g.graded_at, g.id",
        )
        .bind(tenant_id)
        .bind(student_id)
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Grading schema
    // -----------------------------------------------------------------------

    pub async fn find_schema(pool: &PgPool, tenant_id: DbId) -> Result<Option<GradingSchemaRow>, sqlx::Error> {
        sqlx::query_as::<_, GradingSchemaRow>(
            "SELECT tenant_id, bands FROM grading_schemas WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert_schema(pool: &PgPool, schema: &GradingSchema) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO grading_schemas (tenant_id, bands, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (tenant_id) DO UPDATE SET bands = EXCLUDED.bands, updated_at = now()",
        )
        .bind(schema.tenant_id)
        .bind(Json(&schema.bands))
        .execute(pool)
        .await?;
        Ok(())
    }
}
