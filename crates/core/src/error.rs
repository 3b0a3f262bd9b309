use crate::journey::state::NodeState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Illegal transition {from} -> {to}: {reason}")]
    IllegalTransition {
        from: NodeState,
        to: NodeState,
        reason: String,
    },

    #[error("Prerequisites not satisfied: {}", blocking.join(", "))]
    PrereqNotSatisfied { blocking: Vec<String> },

    #[error("Node instance is immutable in state {state}")]
    StateImmutable { state: NodeState },

    /// A concurrent writer won the race, or a session collides with
    /// existing ones. `reason` is the conflict kind when one applies.
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        reason: Option<String>,
        offenders: Vec<String>,
    },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid playbook catalogue: {0}")]
    BadCatalogue(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// A lost race with no further detail.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            reason: None,
            offenders: Vec::new(),
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadInput(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::PrereqNotSatisfied { .. } => "PREREQ_NOT_SATISFIED",
            Self::StateImmutable { .. } => "STATE_IMMUTABLE",
            Self::Conflict { .. } => "CONFLICT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::BadCatalogue(_) => "BAD_CATALOGUE",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
