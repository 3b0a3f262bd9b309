//! Repository for the `users` and `memberships` tables.

use campus_core::tenancy::{Membership, NewUser};
use campus_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::tenancy::{MembershipRow, UserRow};

/// Column list for `users` SELECT queries.
const COLUMNS: &str = "\
    id, username, email, password_hash, display_name, \
    program_id, specialty, cohort_id, active, created_at";

pub struct UserRepo;

impl UserRepo {
    pub async fn create(pool: &PgPool, input: &NewUser) -> Result<UserRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, display_name, program_id, cohort_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(new_id())
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(&input.display_name)
            .bind(input.program_id)
            .bind(input.cohort_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<UserRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Memberships
    // -----------------------------------------------------------------------

    /// Insert or replace the role of `(tenant, user)`.
    pub async fn upsert_membership(pool: &PgPool, membership: &Membership) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO memberships (tenant_id, user_id, role) VALUES ($1, $2, $3)
             ON CONFLICT (tenant_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(membership.tenant_id)
        .bind(membership.user_id)
        .bind(membership.role.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_membership(
        pool: &PgPool,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<Option<MembershipRow>, sqlx::Error> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT tenant_id, user_id, role FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}
