//! Repository for the `builder_nodes` table.

use campus_core::curriculum::NodeInput;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::curriculum::BuilderNodeRow;

const COLUMNS: &str = "\
    id, tenant_id, program_version_id, node_id, node_type, title, world_key, \
    prerequisites, requirements, config, created_at, updated_at";

pub struct BuilderNodeRepo;

impl BuilderNodeRepo {
    pub async fn list(
        pool: &PgPool,
        tenant_id: DbId,
        version_id: DbId,
    ) -> Result<Vec<BuilderNodeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM builder_nodes
             WHERE program_version_id = $1 AND tenant_id = $2
             ORDER BY node_id"
        );
        sqlx::query_as::<_, BuilderNodeRow>(&query)
            .bind(version_id)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    pub async fn insert(
        pool: &PgPool,
        tenant_id: DbId,
        version_id: DbId,
        input: &NodeInput,
        at: Timestamp,
    ) -> Result<BuilderNodeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO builder_nodes
                 (id, tenant_id, program_version_id, node_id, node_type, title, world_key,
                  prerequisites, requirements, config, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BuilderNodeRow>(&query)
            .bind(new_id())
            .bind(tenant_id)
            .bind(version_id)
            .bind(&input.node_id)
            .bind(input.node_type.as_str())
            .bind(Json(&input.title))
            .bind(&input.world_key)
            .bind(&input.prerequisites)
            .bind(Json(&input.requirements))
            .bind(Json(&input.config))
            .bind(at)
            .fetch_one(pool)
            .await
    }

    /// Replace everything but the node id. `None` when the node is absent.
    pub async fn update(
        pool: &PgPool,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
        input: &NodeInput,
        at: Timestamp,
    ) -> Result<Option<BuilderNodeRow>, sqlx::Error> {
        let query = format!(
            "UPDATE builder_nodes
             SET node_type = $4, title = $5, world_key = $6, prerequisites = $7,
                 requirements = $8, config = $9, updated_at = $10
             WHERE program_version_id = $1 AND tenant_id = $2 AND node_id = $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BuilderNodeRow>(&query)
            .bind(version_id)
            .bind(tenant_id)
            .bind(node_id)
            .bind(input.node_type.as_str())
            .bind(Json(&input.title))
            .bind(&input.world_key)
            .bind(&input.prerequisites)
            .bind(Json(&input.requirements))
            .bind(Json(&input.config))
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(
        pool: &PgPool,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM builder_nodes WHERE program_version_id = $1 AND tenant_id = $2 AND node_id = $3",
        )
        .bind(version_id)
        .bind(tenant_id)
        .bind(node_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_prerequisites(
        conn: &mut PgConnection,
        tenant_id: DbId,
        version_id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE builder_nodes SET prerequisites = '{}', updated_at = $3
             WHERE program_version_id = $1 AND tenant_id = $2",
        )
        .bind(version_id)
        .bind(tenant_id)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn set_prerequisites(
        conn: &mut PgConnection,
        tenant_id: DbId,
        version_id: DbId,
        node_id: &str,
        prerequisites: &[String],
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE builder_nodes SET prerequisites = $4, updated_at = $5
             WHERE program_version_id = $1 AND tenant_id = $2 AND node_id = $3",
        )
        .bind(version_id)
        .bind(tenant_id)
        .bind(node_id)
        .bind(prerequisites)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Copy every node of `from` into `to` with fresh ids.
    pub async fn copy_version(
        conn: &mut PgConnection,
        tenant_id: DbId,
        from: DbId,
        to: DbId,
        at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO builder_nodes
                 (id, tenant_id, program_version_id, node_id, node_type, title, world_key,
                  prerequisites, requirements, config, created_at, updated_at)
             SELECT gen_random_uuid(), tenant_id, $3, node_id, node_type, title, world_key,
                    prerequisites, requirements, config, $4, $4
             FROM builder_nodes
             WHERE program_version_id = $2 AND tenant_id = $1",
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
