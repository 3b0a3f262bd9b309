//! Repository for scheduling reference data: `academic_terms`, `rooms`
//! and `cohorts`.

use campus_core::scheduling::model::{NewRoom, NewTerm};
use campus_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::scheduling::{CohortRow, RoomRow, TermRow};

const TERM_COLUMNS: &str = "id, tenant_id, name, code, start_date, end_date, is_closed, created_at";

const ROOM_COLUMNS: &str = "id, tenant_id, name, capacity, building, active";

pub struct ReferenceRepo;

impl ReferenceRepo {
    // -----------------------------------------------------------------------
    // Terms
    // -----------------------------------------------------------------------

    pub async fn create_term(pool: &PgPool, tenant_id: DbId, input: &NewTerm) -> Result<TermRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO academic_terms (id, tenant_id, name, code, start_date, end_date, is_closed)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {TERM_COLUMNS}"
        );
        sqlx::query_as::<_, TermRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(&input.name)
            .bind(&input.code)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.is_closed)
            .fetch_one(pool)
            .await
    }

    pub async fn find_term(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<TermRow>, sqlx::Error> {
        let query = format!("SELECT {TERM_COLUMNS} FROM academic_terms WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, TermRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_terms(pool: &PgPool, tenant_id: DbId) -> Result<Vec<TermRow>, sqlx::Error> {
        let query = format!(
            "SELECT {TERM_COLUMNS} FROM academic_terms WHERE tenant_id = $1 ORDER BY start_date, id"
        );
        sqlx::query_as::<_, TermRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    pub async fn close_term(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<TermRow>, sqlx::Error> {
        let query = format!(
            "UPDATE academic_terms SET is_closed = TRUE
             WHERE id = $1 AND tenant_id = $2
             RETURNING {TERM_COLUMNS}"
        );
        sqlx::query_as::<_, TermRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    pub async fn create_room(pool: &PgPool, tenant_id: DbId, input: &NewRoom) -> Result<RoomRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO rooms (id, tenant_id, name, capacity, building)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ROOM_COLUMNS}"
        );
        sqlx::query_as::<_, RoomRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(&input.name)
            .bind(input.capacity)
            .bind(&input.building)
            .fetch_one(pool)
            .await
    }

    pub async fn find_room(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<Option<RoomRow>, sqlx::Error> {
        let query = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, RoomRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Rooms ordered by id, the solver's tie-break order.
    pub async fn list_rooms(pool: &PgPool, tenant_id: DbId) -> Result<Vec<RoomRow>, sqlx::Error> {
        let query = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE tenant_id = $1 ORDER BY id");
        sqlx::query_as::<_, RoomRow>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Cohorts
    // -----------------------------------------------------------------------

    pub async fn create_cohort(pool: &PgPool, tenant_id: DbId, name: &str) -> Result<CohortRow, sqlx::Error> {
        sqlx::query_as::<_, CohortRow>(
            "INSERT INTO cohorts (id, tenant_id, name) VALUES ($1, $2, $3) RETURNING id, tenant_id, name",
        )
        .bind(new_id())
        .bind(tenant_id)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn list_cohorts(pool: &PgPool, tenant_id: DbId) -> Result<Vec<CohortRow>, sqlx::Error> {
        sqlx::query_as::<_, CohortRow>(
            "SELECT id, tenant_id, name FROM cohorts WHERE tenant_id = $1 ORDER BY name, id",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }
}
