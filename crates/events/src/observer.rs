use std::sync::Arc;

use campus_core::journey::{JourneyObserver, TransitionNotice};

use crate::bus::{event_types, EventBus, PlatformEvent};

/// Publishes every committed journey transition as a
/// `journey.state_changed` event. Never blocks the caller.
pub struct BusObserver {
    bus: Arc<EventBus>,
}

impl BusObserver {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl JourneyObserver for BusObserver {
    fn on_transition(&self, notice: &TransitionNotice) {
        self.bus.publish(
            PlatformEvent::new(event_types::JOURNEY_STATE_CHANGED)
                .with_tenant(notice.tenant_id)
                .with_source("node_instance", notice.instance_id)
                .with_actor(notice.actor)
                .with_correlation_id(notice.correlation_id.clone())
                .with_payload(serde_json::json!({
                    "user_id": notice.user_id,
                    "node_id": notice.node_id,
                    "from": notice.from,
                    "to": notice.to,
                    "note": notice.note,
                    "correlation_id": notice.correlation_id,
                    "at": notice.at,
                })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::journey::NodeState;
    use campus_core::types::{new_id, now};

    #[tokio::test]
    async fn transition_is_published_with_routing_fields() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let observer = BusObserver::new(Arc::clone(&bus));
        let notice = TransitionNotice {
            tenant_id: new_id(),
            user_id: new_id(),
            node_id: "proposal".into(),
            instance_id: new_id(),
            from: NodeState::Submitted,
            to: NodeState::NeedsFixes,
            actor: new_id(),
            note: Some("Add a methods section".into()),
            correlation_id: "req-1".into(),
            at: now(),
        };

        observer.on_transition(&notice);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, event_types::JOURNEY_STATE_CHANGED);
        assert_eq!(event.tenant_id, Some(notice.tenant_id));
        assert_eq!(event.correlation_id.as_deref(), Some("req-1"));
        assert_eq!(event.payload["node_id"], "proposal");
        assert_eq!(event.payload["to"], "needs_fixes");
        assert_eq!(event.payload["user_id"], notice.user_id.to_string());
    }
}
