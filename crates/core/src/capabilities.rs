//! The single capability check evaluated before any state machine or
//! scheduler mutation.

use crate::context::RequestContext;
use crate::error::CoreError;
use crate::roles::Role;
use crate::types::DbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewOwnJourney,
    EditOwnSubmission,
    ViewStudentJourney,
    ReviewSubmission,
    OverrideJourney,
    ExternalCheck,
    ManageSchedule,
    ViewSchedule,
    RunAutoScheduler,
    EditCurriculum,
    PublishCurriculum,
    Grade,
    ViewGrades,
}

/// What the action is performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Tenant-wide data (schedule, curriculum, gradebook).
    Tenant,
    /// Data owned by a single user (journey, grades).
    OwnedBy(DbId),
}

impl Resource {
    fn is_owned_by(self, user_id: DbId) -> bool {
        matches!(self, Resource::OwnedBy(owner) if owner == user_id)
    }
}

/// Check whether the actor in `ctx` may perform `action` on `resource`.
pub fn can(ctx: &RequestContext, action: Action, resource: Resource) -> Result<(), CoreError> {
    let role = ctx.role;
    let own = resource.is_owned_by(ctx.user_id);

    let allowed = match action {
        Action::ViewOwnJourney | Action::EditOwnSubmission => own,
        Action::ViewStudentJourney => own || role.is_staff() || role == Role::System,
        Action::ReviewSubmission => role.is_reviewer(),
        Action::OverrideJourney => role.is_admin(),
        Action::ExternalCheck => role == Role::System,
        Action::ManageSchedule | Action::RunAutoScheduler => role.is_admin(),
        Action::ViewSchedule => role != Role::System,
        Action::EditCurriculum | Action::PublishCurriculum => role.is_admin(),
        Action::Grade => matches!(role, Role::Instructor) || role.is_admin(),
        Action::ViewGrades => own || role.is_staff(),
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            role = %role,
            ?action,
            ?resource,
            "Capability denied",
        );
        Err(CoreError::Forbidden(format!(
            "Role '{role}' may not perform {action:?}"
        )))
    }
}
