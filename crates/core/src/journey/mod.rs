//! Per-user journeys over a playbook: node instances, form revisions,
//! uploads, the event log and the state machine that governs them.

pub mod engine;
pub mod model;
pub mod state;

pub use engine::{
    fold_events, JourneyEngine, JourneyProgress, Scoreboard, ScoreboardEntry, SubmissionView, WorldProgress,
};
pub use model::{FormData, NodeEvent, NodeInstance};
pub use state::NodeState;

use serde::Serialize;

use crate::types::{DbId, Timestamp};

/// A committed state change, as handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionNotice {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub node_id: String,
    pub instance_id: DbId,
    pub from: NodeState,
    pub to: NodeState,
    pub actor: DbId,
    pub note: Option<String>,
    pub correlation_id: String,
    pub at: Timestamp,
}

/// Receives every committed transition. Implementations must not block;
/// delivery is fire-and-forget.
pub trait JourneyObserver: Send + Sync {
    fn on_transition(&self, notice: &TransitionNotice);
}

/// Observer that drops every notice.
pub struct NoopObserver;

impl JourneyObserver for NoopObserver {
    fn on_transition(&self, _notice: &TransitionNotice) {}
}
