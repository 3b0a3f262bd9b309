//! Durable activity log.
//!
//! [`ActivityPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every received [`PlatformEvent`] to `activity_logs`. It runs
//! as a long-lived background task and stops when the bus is dropped or the
//! shutdown token fires.

use campus_db::repositories::{ActivityRepo, CreateActivity};
use campus_db::DbPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;

pub struct ActivityPersistence;

impl ActivityPersistence {
    pub async fn run(
        pool: DbPool,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Activity persistence cancelled");
                    break;
                }
                received = receiver.recv() => received,
            };
            match received {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist activity"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Activity persistence lagged, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, activity persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &PlatformEvent) -> Result<i64, sqlx::Error> {
        ActivityRepo::insert(
            pool,
            &CreateActivity {
                tenant_id: event.tenant_id,
                event_type: &event.event_type,
                source_entity_type: event.source_entity_type.as_deref(),
                source_entity_id: event.source_entity_id,
                actor_user_id: event.actor_user_id,
                correlation_id: event.correlation_id.as_deref(),
                payload: &event.payload,
                occurred_at: event.timestamp,
            },
        )
        .await
    }
}
