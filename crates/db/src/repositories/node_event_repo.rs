//! Repository for `node_events` and `node_outcomes`.

use campus_core::journey::model::{Decision, EventType};
use campus_core::journey::NodeState;
use campus_core::types::{new_id, DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::journey::{NodeEventRow, NodeOutcomeRow};

const COLUMNS: &str = "id, instance_id, seq, event_type, from_state, to_state, actor, payload, at";

const OUTCOME_COLUMNS: &str = "id, instance_id, decision, note, decided_by, decided_at";

/// Insert DTO for one event log entry.
#[derive(Debug, Clone)]
pub struct CreateNodeEvent<'a> {
    pub instance_id: DbId,
    pub event_type: EventType,
    pub transition: Option<(NodeState, NodeState)>,
    pub actor: DbId,
    pub payload: &'a serde_json::Value,
    pub at: Timestamp,
}

pub struct NodeEventRepo;

impl NodeEventRepo {
    /// Append with the next sequence number of the instance.
    ///
    /// The caller must hold the instance row lock; `MAX(seq) + 1` is only
    /// dense under that lock. The unique `(instance_id, seq)` constraint
    /// backs it up.
    pub async fn append(
        conn: &mut PgConnection,
        event: &CreateNodeEvent<'_>,
    ) -> Result<NodeEventRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO node_events (id, instance_id, seq, event_type, from_state, to_state, actor, payload, at)
             SELECT $1, $2, COALESCE(MAX(seq), 0) + 1, $3, $4, $5, $6, $7, $8
             FROM node_events WHERE instance_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeEventRow>(&query)
            .bind(new_id())
            .bind(event.instance_id)
            .bind(event.event_type.as_str())
            .bind(event.transition.map(|t| t.0.as_str()))
            .bind(event.transition.map(|t| t.1.as_str()))
            .bind(event.actor)
            .bind(event.payload)
            .bind(event.at)
            .fetch_one(conn)
            .await
    }

    /// Events with `seq > since`, oldest first.
    pub async fn list_since(
        pool: &PgPool,
        tenant_id: DbId,
        instance_id: DbId,
        since: i64,
    ) -> Result<Vec<NodeEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM node_events
             WHERE instance_id = $1 AND seq > $2
               AND EXISTS (SELECT 1 FROM node_instances WHERE id = $1 AND tenant_id = $3)
             ORDER BY seq"
        );
        sqlx::query_as::<_, NodeEventRow>(&query)
            .bind(instance_id)
            .bind(since)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    pub async fn insert_outcome(
        conn: &mut PgConnection,
        instance_id: DbId,
        decision: Decision,
        note: Option<&str>,
        decided_by: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO node_outcomes (id, instance_id, decision, note, decided_by, decided_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(new_id())
        .bind(instance_id)
        .bind(decision.as_str())
        .bind(note)
        .bind(decided_by)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_outcomes(
        pool: &PgPool,
        tenant_id: DbId,
        instance_id: DbId,
    ) -> Result<Vec<NodeOutcomeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {OUTCOME_COLUMNS} FROM node_outcomes
             WHERE instance_id = $1
               AND EXISTS (SELECT 1 FROM node_instances WHERE id = $1 AND tenant_id = $2)
             ORDER BY decided_at, id"
        );
        sqlx::query_as::<_, NodeOutcomeRow>(&query)
            .bind(instance_id)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}
