//! In-process fan-out of platform events over `tokio::sync::broadcast`.
//!
//! Publishers are the journey observer and the scheduling and curriculum
//! handlers; subscribers are the activity log writer and the email router.
//! Events raised while serving a request carry its correlation id so a
//! request can be traced through the activity log.

use campus_core::context::RequestContext;
use campus_core::types::{now, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod event_types {
    pub const JOURNEY_STATE_CHANGED: &str = "journey.state_changed";
    pub const CURRICULUM_PUBLISHED: &str = "curriculum.published";
    pub const SESSIONS_CREATED: &str = "schedule.sessions_created";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dotted name, one of [`event_types`].
    pub event_type: String,
    pub tenant_id: Option<DbId>,
    /// Entity kind the event is about, e.g. `"node_instance"`.
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub correlation_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id: None,
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            correlation_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: now(),
        }
    }

    /// An event raised by the request behind `ctx`: tenant, actor and
    /// correlation id are taken from it.
    pub fn from_context(event_type: impl Into<String>, ctx: &RequestContext) -> Self {
        Self::new(event_type)
            .with_tenant(ctx.tenant_id)
            .with_actor(ctx.user_id)
            .with_correlation_id(ctx.correlation_id.clone())
    }

    pub fn with_tenant(mut self, tenant_id: DbId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

const DEFAULT_CAPACITY: usize = 1024;

/// Shared as `Arc<EventBus>`. A full buffer drops the oldest events and
/// slow receivers see `RecvError::Lagged`. Dropping the last handle closes
/// the channel, which is how background subscribers learn to stop.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fan `event` out to every current subscriber and return how many
    /// received it. Never blocks; with no subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(event_type = %event.event_type, "No subscribers for event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
