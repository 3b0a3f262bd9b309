//! Request-scoped identity and cancellation.

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::roles::Role;
use crate::types::DbId;

/// Who is acting, on behalf of which tenant, for which request.
///
/// Built once at the boundary and never mutated. Every store call made on
/// behalf of a request is preceded by [`RequestContext::checkpoint`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub role: Role,
    pub correlation_id: String,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(tenant_id: DbId, user_id: DbId, role: Role) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Context for integration hooks acting as the `system` actor.
    pub fn system(tenant_id: DbId) -> Self {
        Self::new(tenant_id, uuid::Uuid::nil(), Role::System)
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail fast once the request has been cancelled.
    pub fn checkpoint(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}
