//! Repository for `node_instances`, `form_revisions`, `upload_fulfilments`
//! and the `journey_state` projection.

use campus_core::journey::model::{FormData, InstanceKey};
use campus_core::journey::NodeState;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::journey::{FormRevisionRow, JourneyStateDbRow, NodeInstanceRow, UploadRow};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const COLUMNS: &str = "\
    id, tenant_id, user_id, node_id, playbook_version_id, state, \
    current_rev, state_entered_rev, created_at, updated_at";

const REVISION_COLUMNS: &str = "instance_id, rev, form_data, edited_by, edited_at";

const UPLOAD_COLUMNS: &str = "instance_id, slot_key, document_id, uploaded_by, uploaded_at";

// ---------------------------------------------------------------------------
// NodeInstanceRepo
// ---------------------------------------------------------------------------

pub struct NodeInstanceRepo;

impl NodeInstanceRepo {
    /// Insert a fresh `active` instance unless the key is taken.
    ///
    /// Returns `None` when another writer already holds the key; the unique
    /// index makes a concurrent inserter wait for that writer to commit.
    pub async fn insert_if_absent(
        conn: &mut PgConnection,
        key: &InstanceKey,
        at: Timestamp,
    ) -> Result<Option<NodeInstanceRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO node_instances
                 (id, tenant_id, user_id, node_id, playbook_version_id, state,
                  current_rev, state_entered_rev, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, 0, 0, $7, $7)
             ON CONFLICT ON CONSTRAINT uq_node_instances_key DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(new_id())
            .bind(key.tenant_id)
            .bind(key.user_id)
            .bind(&key.node_id)
            .bind(key.playbook_version_id)
            .bind(NodeState::Active.as_str())
            .bind(at)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_key<'e, E>(
        executor: E,
        key: &InstanceKey,
    ) -> Result<Option<NodeInstanceRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM node_instances
             WHERE tenant_id = $1 AND user_id = $2 AND playbook_version_id = $3 AND node_id = $4"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(key.tenant_id)
            .bind(key.user_id)
            .bind(key.playbook_version_id)
            .bind(&key.node_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e, E>(
        executor: E,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<NodeInstanceRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM node_instances WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await
    }

    /// Row-lock the instance for the rest of the transaction.
    ///
    /// Every writer that appends to the instance's event log takes this lock
    /// first, which keeps `node_events.seq` dense.
    pub async fn lock(
        conn: &mut PgConnection,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<NodeInstanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM node_instances WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<Vec<NodeInstanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM node_instances
             WHERE tenant_id = $1 AND user_id = $2
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(tenant_id)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Playbook version of the user's oldest instance.
    pub async fn pinned_version(
        pool: &PgPool,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT playbook_version_id FROM node_instances
             WHERE tenant_id = $1 AND user_id = $2
             ORDER BY created_at, id
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Increment `current_rev`. Caller holds the instance lock.
    pub async fn bump_revision(
        conn: &mut PgConnection,
        id: DbId,
        at: Timestamp,
    ) -> Result<NodeInstanceRow, sqlx::Error> {
        let query = format!(
            "UPDATE node_instances SET current_rev = current_rev + 1, updated_at = $2
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(id)
            .bind(at)
            .fetch_one(conn)
            .await
    }

    pub async fn touch(conn: &mut PgConnection, id: DbId, at: Timestamp) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE node_instances SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Compare-and-set the state. `None` when the row is no longer in
    /// `from`; a concurrent updater is waited on and then re-checked.
    pub async fn compare_and_set_state(
        conn: &mut PgConnection,
        tenant_id: DbId,
        id: DbId,
        from: NodeState,
        to: NodeState,
        at: Timestamp,
    ) -> Result<Option<NodeInstanceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE node_instances
             SET state = $4, state_entered_rev = current_rev, updated_at = $5
             WHERE id = $1 AND tenant_id = $2 AND state = $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeInstanceRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(conn)
            .await
    }

    // -----------------------------------------------------------------------
    // Form revisions
    // -----------------------------------------------------------------------

    pub async fn insert_revision(
        conn: &mut PgConnection,
        instance_id: DbId,
        rev: i32,
        form_data: &FormData,
        edited_by: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO form_revisions (instance_id, rev, form_data, edited_by, edited_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(instance_id)
        .bind(rev)
        .bind(form_data.as_str())
        .bind(edited_by)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn find_revision(
        pool: &PgPool,
        tenant_id: DbId,
        instance_id: DbId,
        rev: i32,
    ) -> Result<Option<FormRevisionRow>, sqlx::Error> {
        sqlx::query_as::<_, FormRevisionRow>(
            "SELECT r.instance_id, r.rev, r.form_data, r.edited_by, r.edited_at
             FROM form_revisions r
             JOIN node_instances i ON i.id = r.instance_id
             WHERE r.instance_id = $1 AND r.rev = $2 AND i.tenant_id = $3",
        )
            .bind(instance_id)
            .bind(rev)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_revisions(
        pool: &PgPool,
        tenant_id: DbId,
        instance_id: DbId,
    ) -> Result<Vec<FormRevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {REVISION_COLUMNS} FROM form_revisions
             WHERE instance_id = $1
               AND EXISTS (SELECT 1 FROM node_instances WHERE id = $1 AND tenant_id = $2)
             ORDER BY rev"
        );
        sqlx::query_as::<_, FormRevisionRow>(&query)
            .bind(instance_id)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Insert or replace the fulfilment of a slot.
    pub async fn upsert_upload(
        conn: &mut PgConnection,
        instance_id: DbId,
        slot_key: &str,
        document_id: DbId,
        uploaded_by: DbId,
        at: Timestamp,
    ) -> Result<UploadRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO upload_fulfilments (instance_id, slot_key, document_id, uploaded_by, uploaded_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (instance_id, slot_key) DO UPDATE
             SET document_id = EXCLUDED.document_id,
                 uploaded_by = EXCLUDED.uploaded_by,
                 uploaded_at = EXCLUDED.uploaded_at
             RETURNING {UPLOAD_COLUMNS}"
        );
        sqlx::query_as::<_, UploadRow>(&query)
            .bind(instance_id)
            .bind(slot_key)
            .bind(document_id)
            .bind(uploaded_by)
            .bind(at)
            .fetch_one(conn)
            .await
    }

    pub async fn list_uploads(
        pool: &PgPool,
        tenant_id: DbId,
        instance_id: DbId,
    ) -> Result<Vec<UploadRow>, sqlx::Error> {
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM upload_fulfilments
             WHERE instance_id = $1
               AND EXISTS (SELECT 1 FROM node_instances WHERE id = $1 AND tenant_id = $2)
             ORDER BY slot_key"
        );
        sqlx::query_as::<_, UploadRow>(&query)
            .bind(instance_id)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Projection
    // -----------------------------------------------------------------------

    pub async fn upsert_projection<'e, E>(
        executor: E,
        tenant_id: DbId,
        user_id: DbId,
        node_id: &str,
        state: NodeState,
        at: Timestamp,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO journey_state (tenant_id, user_id, node_id, state, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tenant_id, user_id, node_id) DO UPDATE
             SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(node_id)
        .bind(state.as_str())
        .bind(at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn list_projection(
        pool: &PgPool,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<Vec<JourneyStateDbRow>, sqlx::Error> {
        sqlx::query_as::<_, JourneyStateDbRow>(
            "SELECT user_id, node_id, state, updated_at FROM journey_state
             WHERE tenant_id = $1 AND user_id = $2
             ORDER BY node_id",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Every `done` projection row in the tenant, for the scoreboard.
    pub async fn list_done(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<JourneyStateDbRow>, sqlx::Error> {
        sqlx::query_as::<_, JourneyStateDbRow>(
            "SELECT user_id, node_id, state, updated_at FROM journey_state
             WHERE tenant_id = $1 AND state = 'done'
             ORDER BY user_id, node_id",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Delete a user's instances. Revisions, uploads, events and outcomes
    /// follow through `ON DELETE CASCADE`.
    pub async fn delete_for_user(
        conn: &mut PgConnection,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM node_instances WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_projection(
        conn: &mut PgConnection,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM journey_state WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
