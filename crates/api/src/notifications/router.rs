//! Event-to-email routing.
//!
//! [`NotificationRouter`] subscribes to the platform event bus and emails a
//! student whenever someone else moves one of their journey nodes (review
//! decisions, locks, overrides). Delivery goes through the bounded
//! [`Notifier`] and never blocks the router loop.

use std::sync::Arc;

use campus_core::error::CoreError;
use campus_core::store::Store;
use campus_core::tenancy::User;
use campus_core::types::DbId;
use campus_events::bus::event_types;
use campus_events::{Notification, Notifier, PlatformEvent};
use tokio::sync::broadcast;

pub struct NotificationRouter {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl NotificationRouter {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Run the routing loop until the event bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.route_event(&event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to route event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    async fn route_event(&self, event: &PlatformEvent) -> Result<(), CoreError> {
        let Some(owner) = recipient(event) else {
            return Ok(());
        };
        let Some(user) = self.store.user(owner).await?.filter(|u| u.active) else {
            return Ok(());
        };
        if let Some(notification) = compose(event, &user) {
            self.notifier.notify(notification);
        }
        Ok(())
    }
}

/// Owner of the node when the change was made by someone else.
fn recipient(event: &PlatformEvent) -> Option<DbId> {
    if event.event_type != event_types::JOURNEY_STATE_CHANGED {
        return None;
    }
    let owner: DbId = event.payload.get("user_id")?.as_str()?.parse().ok()?;
    (event.actor_user_id != Some(owner)).then_some(owner)
}

fn compose(event: &PlatformEvent, user: &User) -> Option<Notification> {
    let node = event.payload.get("node_id")?.as_str()?;
    let to = event.payload.get("to")?.as_str()?;
    let subject = match to {
        "done" => format!("'{node}' was approved"),
        "needs_fixes" => format!("'{node}' needs changes"),
        "locked" => format!("'{node}' was locked"),
        other => format!("'{node}' is now {other}"),
    };
    let mut body = format!("Hello {},\n\nYour step '{node}' moved to '{to}'.", user.display_name);
    if let Some(note) = event.payload.get("note").and_then(|n| n.as_str()) {
        body.push_str("\n\nReviewer note:\n");
        body.push_str(note);
    }
    Some(Notification {
        to: user.email.clone(),
        subject,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::types::{new_id, now};

    fn state_changed(owner: DbId, actor: DbId, to: &str) -> PlatformEvent {
        PlatformEvent::new(event_types::JOURNEY_STATE_CHANGED)
            .with_actor(actor)
            .with_payload(serde_json::json!({
                "user_id": owner,
                "node_id": "proposal",
                "to": to,
                "note": "Cite your sources",
            }))
    }

    fn user(id: DbId) -> User {
        User {
            id,
            username: "ada".into(),
            email: "ada@example.edu".into(),
            password_hash: String::new(),
            display_name: "Ada".into(),
            program_id: None,
            specialty: None,
            cohort_id: None,
            active: true,
            created_at: now(),
        }
    }

    #[test]
    fn reviewer_decision_targets_owner() {
        let owner = new_id();
        assert_eq!(recipient(&state_changed(owner, new_id(), "done")), Some(owner));
    }

    #[test]
    fn own_transition_is_not_emailed() {
        let owner = new_id();
        assert_eq!(recipient(&state_changed(owner, owner, "submitted")), None);
    }

    #[test]
    fn other_event_types_are_ignored() {
        let event = PlatformEvent::new(event_types::CURRICULUM_PUBLISHED).with_actor(new_id());
        assert_eq!(recipient(&event), None);
    }

    #[test]
    fn needs_fixes_email_includes_note() {
        let owner = new_id();
        let n = compose(&state_changed(owner, new_id(), "needs_fixes"), &user(owner)).unwrap();
        assert_eq!(n.to, "ada@example.edu");
        assert_eq!(n.subject, "'proposal' needs changes");
        assert!(n.body.contains("Cite your sources"));
    }
}
