//! Repository for the `programs` and `courses` tables.

use campus_core::curriculum::{NewCourse, NewProgram};
use campus_core::types::{new_id, DbId};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::curriculum::{CourseRow, ProgramRow};

const COLUMNS: &str = "\
    id, tenant_id, code, title, active_version_id, active_playbook_version_id, created_at";

const COURSE_COLUMNS: &str = "id, tenant_id, program_id, code, title, credits, created_at";

pub struct ProgramRepo;

impl ProgramRepo {
    pub async fn create(pool: &PgPool, tenant_id: DbId, input: &NewProgram) -> Result<ProgramRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO programs (id, tenant_id, code, title)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProgramRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(&input.code)
            .bind(Json(&input.title))
            .fetch_one(pool)
            .await
    }

    pub async fn find(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<ProgramRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM programs WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, ProgramRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, tenant_id: DbId) -> Result<Vec<ProgramRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM programs WHERE tenant_id = $1 ORDER BY code");
        sqlx::query_as::<_, ProgramRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Flip the active pointers after a publish.
    pub async fn set_active(
        conn: &mut PgConnection,
        tenant_id: DbId,
        id: DbId,
        version_id: DbId,
        playbook_version_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE programs SET active_version_id = $3, active_playbook_version_id = $4
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(version_id)
        .bind(playbook_version_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Courses
    // -----------------------------------------------------------------------

    pub async fn create_course(
        pool: &PgPool,
        tenant_id: DbId,
        input: &NewCourse,
    ) -> Result<CourseRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO courses (id, tenant_id, program_id, code, title, credits)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COURSE_COLUMNS}"
        );
        sqlx::query_as::<_, CourseRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(input.program_id)
            .bind(&input.code)
            .bind(Json(&input.title))
            .bind(input.credits)
            .fetch_one(pool)
            .await
    }

    pub async fn find_course(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<CourseRow>, sqlx::Error> {
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, CourseRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_courses(pool: &PgPool, tenant_id: DbId) -> Result<Vec<CourseRow>, sqlx::Error> {
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE tenant_id = $1 ORDER BY code");
        sqlx::query_as::<_, CourseRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}
