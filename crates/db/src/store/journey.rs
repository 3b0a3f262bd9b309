use campus_core::error::{CoreError, CoreResult};
use campus_core::journey::model::{
    EventType, FormData, FormRevision, InstanceKey, JourneyStateRow, NewNodeEvent, NodeEvent,
    NodeInstance, NodeOutcome, StateChange, UploadFulfilment,
};
use campus_core::journey::NodeState;
use campus_core::playbook::{NewPlaybookVersion, PlaybookVersion};
use campus_core::store::JourneyStore;
use campus_core::types::{now, DbId};
use serde_json::json;
use sqlx::PgConnection;

use super::{try_convert, PgStore};
use crate::error::map_db_error;
use crate::repositories::node_event_repo::CreateNodeEvent;
use crate::repositories::{NodeEventRepo, NodeInstanceRepo, PlaybookVersionRepo};

/// Lock an instance and reject the write unless it is in an editable state.
async fn lock_editable(conn: &mut PgConnection, tenant_id: DbId, instance_id: DbId) -> CoreResult<NodeInstance> {
    let instance: NodeInstance = NodeInstanceRepo::lock(conn, tenant_id, instance_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| CoreError::not_found("node_instance", instance_id))?
        .try_into()?;
    if !instance.state.is_editable() {
        return Err(CoreError::StateImmutable {
            state: instance.state,
        });
    }
    Ok(instance)
}

#[async_trait::async_trait]
impl JourneyStore for PgStore {
    async fn insert_playbook_version(
        &self,
        tenant_id: DbId,
        input: &NewPlaybookVersion,
    ) -> CoreResult<PlaybookVersion> {
        let row = PlaybookVersionRepo::insert(&self.pool, tenant_id, input, now())
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn playbook_version(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<PlaybookVersion>> {
        let row = PlaybookVersionRepo::find(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn activate_playbook_version(&self, tenant_id: DbId, version_id: DbId) -> CoreResult<()> {
        self.require("playbook_versions", "playbook_version", tenant_id, version_id)
            .await?;
        PlaybookVersionRepo::activate(&self.pool, tenant_id, version_id)
            .await
            .map_err(map_db_error)
    }

    async fn active_playbook_version(&self, tenant_id: DbId) -> CoreResult<Option<DbId>> {
        PlaybookVersionRepo::active_for_tenant(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)
    }

    async fn pinned_version(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Option<DbId>> {
        NodeInstanceRepo::pinned_version(&self.pool, tenant_id, user_id)
            .await
            .map_err(map_db_error)
    }

    async fn get_or_create_instance(
        &self,
        key: &InstanceKey,
        actor: DbId,
    ) -> CoreResult<(NodeInstance, bool)> {
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        if let Some(row) = NodeInstanceRepo::insert_if_absent(&mut tx, key, at)
            .await
            .map_err(map_db_error)?
        {
            let instance = NodeInstance::try_from(row)?;
            NodeInstanceRepo::upsert_projection(
                &mut *tx,
                key.tenant_id,
                key.user_id,
                &key.node_id,
                NodeState::Active,
                at,
            )
            .await
            .map_err(map_db_error)?;
            let payload = json!({ "playbook_version_id": key.playbook_version_id });
            NodeEventRepo::append(
                &mut tx,
                &CreateNodeEvent {
                    instance_id: instance.id,
                    event_type: EventType::Created,
                    transition: None,
                    actor,
                    payload: &payload,
                    at,
                },
            )
            .await
            .map_err(map_db_error)?;
            tx.commit().await.map_err(map_db_error)?;
            return Ok((instance, true));
        }
        tx.rollback().await.map_err(map_db_error)?;

        // Another writer created it first; its row is committed by now.
        let row = NodeInstanceRepo::find_by_key(&self.pool, key)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| CoreError::conflict("Node instance was removed during creation"))?;
        Ok((row.try_into()?, false))
    }

    async fn find_instance(&self, key: &InstanceKey) -> CoreResult<Option<NodeInstance>> {
        NodeInstanceRepo::find_by_key(&self.pool, key)
            .await
            .map_err(map_db_error)?
            .map(NodeInstance::try_from)
            .transpose()
    }

    async fn instance(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<NodeInstance>> {
        NodeInstanceRepo::find_by_id(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?
            .map(NodeInstance::try_from)
            .transpose()
    }

    async fn list_instances(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<NodeInstance>> {
        let rows = NodeInstanceRepo::list_for_user(&self.pool, tenant_id, user_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn append_form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        form_data: &FormData,
        actor: DbId,
    ) -> CoreResult<NodeInstance> {
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        lock_editable(&mut tx, tenant_id, instance_id).await?;

        let updated: NodeInstance = NodeInstanceRepo::bump_revision(&mut tx, instance_id, at)
            .await
            .map_err(map_db_error)?
            .try_into()?;
        NodeInstanceRepo::insert_revision(&mut tx, instance_id, updated.current_rev, form_data, actor, at)
            .await
            .map_err(map_db_error)?;
        let payload = json!({ "rev": updated.current_rev });
        NodeEventRepo::append(
            &mut tx,
            &CreateNodeEvent {
                instance_id,
                event_type: EventType::FormSaved,
                transition: None,
                actor,
                payload: &payload,
                at,
            },
        )
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(updated)
    }

    async fn form_revision(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        rev: i32,
    ) -> CoreResult<Option<FormRevision>> {
        let row = NodeInstanceRepo::find_revision(&self.pool, tenant_id, instance_id, rev)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_form_revisions(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<FormRevision>> {
        let rows = NodeInstanceRepo::list_revisions(&self.pool, tenant_id, instance_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn attach_upload(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        slot_key: &str,
        document_id: DbId,
        actor: DbId,
    ) -> CoreResult<UploadFulfilment> {
        let at = now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        lock_editable(&mut tx, tenant_id, instance_id).await?;

        NodeInstanceRepo::touch(&mut tx, instance_id, at)
            .await
            .map_err(map_db_error)?;
        let row = NodeInstanceRepo::upsert_upload(&mut tx, instance_id, slot_key, document_id, actor, at)
            .await
            .map_err(map_db_error)?;
        let payload = json!({ "slot_key": slot_key, "document_id": document_id });
        NodeEventRepo::append(
            &mut tx,
            &CreateNodeEvent {
                instance_id,
                event_type: EventType::UploadAttached,
                transition: None,
                actor,
                payload: &payload,
                at,
            },
        )
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn list_uploads(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<UploadFulfilment>> {
        let rows = NodeInstanceRepo::list_uploads(&self.pool, tenant_id, instance_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn commit_transition(&self, change: &StateChange) -> CoreResult<Option<NodeInstance>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let Some(row) = NodeInstanceRepo::compare_and_set_state(
            &mut tx,
            change.tenant_id,
            change.instance_id,
            change.from,
            change.to,
            change.at,
        )
        .await
        .map_err(map_db_error)?
        else {
            let exists = NodeInstanceRepo::find_by_id(&mut *tx, change.tenant_id, change.instance_id)
                .await
                .map_err(map_db_error)?
                .is_some();
            tx.rollback().await.map_err(map_db_error)?;
            return if exists {
                Ok(None)
            } else {
                Err(CoreError::not_found("node_instance", change.instance_id))
            };
        };
        let updated = NodeInstance::try_from(row)?;

        NodeInstanceRepo::upsert_projection(
            &mut *tx,
            change.tenant_id,
            change.user_id,
            &change.node_id,
            change.to,
            change.at,
        )
        .await
        .map_err(map_db_error)?;
        NodeEventRepo::append(
            &mut tx,
            &CreateNodeEvent {
                instance_id: change.instance_id,
                event_type: EventType::StateChanged,
                transition: Some((change.from, change.to)),
                actor: change.actor,
                payload: &change.payload,
                at: change.at,
            },
        )
        .await
        .map_err(map_db_error)?;

        if let Some((decision, note)) = &change.outcome {
            NodeEventRepo::insert_outcome(
                &mut tx,
                change.instance_id,
                *decision,
                note.as_deref(),
                change.actor,
                change.at,
            )
            .await
            .map_err(map_db_error)?;
            if let Some(note) = note {
                let payload = json!({ "decision": decision.as_str(), "note": note });
                NodeEventRepo::append(
                    &mut tx,
                    &CreateNodeEvent {
                        instance_id: change.instance_id,
                        event_type: EventType::OutcomeRecorded,
                        transition: None,
                        actor: change.actor,
                        payload: &payload,
                        at: change.at,
                    },
                )
                .await
                .map_err(map_db_error)?;
            }
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(updated))
    }

    async fn append_event(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        event: &NewNodeEvent,
    ) -> CoreResult<NodeEvent> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        NodeInstanceRepo::lock(&mut tx, tenant_id, instance_id)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| CoreError::not_found("node_instance", instance_id))?;
        let row = NodeEventRepo::append(
            &mut tx,
            &CreateNodeEvent {
                instance_id,
                event_type: event.event_type,
                transition: None,
                actor: event.actor,
                payload: &event.payload,
                at: now(),
            },
        )
        .await
        .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)?;
        NodeEvent::try_from(row)
    }

    async fn list_events(
        &self,
        tenant_id: DbId,
        instance_id: DbId,
        since: Option<i64>,
    ) -> CoreResult<Vec<NodeEvent>> {
        let rows = NodeEventRepo::list_since(&self.pool, tenant_id, instance_id, since.unwrap_or(0))
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn list_outcomes(&self, tenant_id: DbId, instance_id: DbId) -> CoreResult<Vec<NodeOutcome>> {
        let rows = NodeEventRepo::list_outcomes(&self.pool, tenant_id, instance_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn journey_states(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        let rows = NodeInstanceRepo::list_projection(&self.pool, tenant_id, user_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn upsert_journey_state(&self, tenant_id: DbId, row: &JourneyStateRow) -> CoreResult<()> {
        NodeInstanceRepo::upsert_projection(
            &self.pool,
            tenant_id,
            row.user_id,
            &row.node_id,
            row.state,
            row.updated_at,
        )
        .await
        .map_err(map_db_error)
    }

    async fn done_states(&self, tenant_id: DbId) -> CoreResult<Vec<JourneyStateRow>> {
        let rows = NodeInstanceRepo::list_done(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn reset_journey(&self, tenant_id: DbId, user_id: DbId) -> CoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let removed = NodeInstanceRepo::delete_for_user(&mut tx, tenant_id, user_id)
            .await
            .map_err(map_db_error)?;
        NodeInstanceRepo::delete_projection(&mut tx, tenant_id, user_id)
            .await
            .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(removed)
    }
}
