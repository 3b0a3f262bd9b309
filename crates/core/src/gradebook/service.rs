use std::sync::Arc;

use crate::capabilities::{can, Action, Resource};
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::gradebook::{
    cumulative_gpa, Activity, Enrollment, EnrollmentStatus, GpaSummary, GradebookEntry,
    GradingSchema, NewActivity, NewGrade,
};
use crate::store::Store;
use crate::types::DbId;

/// Gradebook operations with capability checks.
pub struct Gradebook<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> Gradebook<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn require_offering(&self, ctx: &RequestContext, offering_id: DbId) -> CoreResult<()> {
        self.store
            .offering(ctx.tenant_id, offering_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("offering", offering_id))
    }

    pub async fn enroll(
        &self,
        ctx: &RequestContext,
        offering_id: DbId,
        student_id: DbId,
    ) -> CoreResult<Enrollment> {
        can(ctx, Action::ManageSchedule, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.require_offering(ctx, offering_id).await?;
        if self.store.membership(ctx.tenant_id, student_id).await?.is_none() {
            return Err(CoreError::not_found("user", student_id));
        }
        self.store.enroll(ctx.tenant_id, offering_id, student_id).await
    }

    pub async fn create_activity(
        &self,
        ctx: &RequestContext,
        offering_id: DbId,
        input: &NewActivity,
    ) -> CoreResult<Activity> {
        can(ctx, Action::Grade, Resource::Tenant)?;
        input.validate()?;
        ctx.checkpoint()?;
        self.require_offering(ctx, offering_id).await?;
        self.store.create_activity(ctx.tenant_id, offering_id, input).await
    }

    /// Record or replace a student's score on an activity. The letter grade
    /// is derived from the tenant's grading schema.
    pub async fn record_grade(
        &self,
        ctx: &RequestContext,
        activity_id: DbId,
        student_id: DbId,
        score: f64,
    ) -> CoreResult<GradebookEntry> {
        can(ctx, Action::Grade, Resource::Tenant)?;
        ctx.checkpoint()?;
        let activity = self
            .store
            .activity(ctx.tenant_id, activity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("activity", activity_id))?;
        if !score.is_finite() || score < 0.0 || score > activity.max_score {
            return Err(CoreError::BadInput(format!(
                "score must be between 0 and {}",
                activity.max_score
            )));
        }
        let enrolled = self
            .store
            .list_enrollments(ctx.tenant_id, activity.offering_id)
            .await?
            .iter()
            .any(|e| e.student_id == student_id && e.status != EnrollmentStatus::Dropped);
        if !enrolled {
            return Err(CoreError::BadInput("Student is not enrolled in this offering".into()));
        }

        let schema = self.schema(ctx.tenant_id).await?;
        let percent = score / activity.max_score * 100.0;
        let grade = schema
            .band_for(percent)
            .map(|b| b.letter.clone())
            .unwrap_or_default();
        let entry = self
            .store
            .upsert_grade(
                ctx.tenant_id,
                &NewGrade {
                    offering_id: activity.offering_id,
                    activity_id,
                    student_id,
                    score,
                    max_score: activity.max_score,
                    grade,
                    graded_by: ctx.user_id,
                },
            )
            .await?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            activity_id = %activity_id,
            student_id = %student_id,
            grade = %entry.grade,
            "Grade recorded",
        );
        Ok(entry)
    }

    pub async fn gradebook(&self, ctx: &RequestContext, offering_id: DbId) -> CoreResult<Vec<GradebookEntry>> {
        can(ctx, Action::Grade, Resource::Tenant)?;
        ctx.checkpoint()?;
        self.require_offering(ctx, offering_id).await?;
        self.store.list_gradebook(ctx.tenant_id, offering_id).await
    }

    pub async fn gpa(&self, ctx: &RequestContext, student_id: DbId) -> CoreResult<GpaSummary> {
        can(ctx, Action::ViewGrades, Resource::OwnedBy(student_id))?;
        ctx.checkpoint()?;
        let records = self.store.student_grade_records(ctx.tenant_id, student_id).await?;
        let schema = self.schema(ctx.tenant_id).await?;
        Ok(cumulative_gpa(student_id, &records, &schema))
    }

    pub async fn set_schema(&self, ctx: &RequestContext, schema: GradingSchema) -> CoreResult<GradingSchema> {
        can(ctx, Action::EditCurriculum, Resource::Tenant)?;
        let schema = GradingSchema {
            tenant_id: ctx.tenant_id,
            ..schema
        }
        .normalized()?;
        ctx.checkpoint()?;
        self.store.set_grading_schema(&schema).await?;
        Ok(schema)
    }

    async fn schema(&self, tenant_id: DbId) -> CoreResult<GradingSchema> {
        Ok(self
            .store
            .grading_schema(tenant_id)
            .await?
            .unwrap_or_else(|| GradingSchema::default_for(tenant_id)))
    }
}
