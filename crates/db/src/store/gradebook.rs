use campus_core::error::CoreResult;
use campus_core::gradebook::{
    Activity, Enrollment, GradeRecord, GradebookEntry, GradingSchema, NewActivity, NewGrade,
};
use campus_core::store::GradebookStore;
use campus_core::types::DbId;

use super::{try_convert, PgStore};
use crate::error::map_db_error;
use crate::repositories::{EnrollmentRepo, GradeRepo};

#[async_trait::async_trait]
impl GradebookStore for PgStore {
    async fn enroll(&self, tenant_id: DbId, offering_id: DbId, student_id: DbId) -> CoreResult<Enrollment> {
        self.require("course_offerings", "offering", tenant_id, offering_id)
            .await?;
        let row = EnrollmentRepo::upsert_active(&self.pool, tenant_id, offering_id, student_id)
            .await
            .map_err(map_db_error)?;
        Enrollment::try_from(row)
    }

    async fn list_enrollments(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<Enrollment>> {
        let rows = EnrollmentRepo::list_for_offering(&self.pool, tenant_id, offering_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn create_activity(
        &self,
        tenant_id: DbId,
        offering_id: DbId,
        input: &NewActivity,
    ) -> CoreResult<Activity> {
        self.require("course_offerings", "offering", tenant_id, offering_id)
            .await?;
        let row = GradeRepo::create_activity(&self.pool, tenant_id, offering_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn activity(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Activity>> {
        let row = GradeRepo::find_activity(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn upsert_grade(&self, tenant_id: DbId, input: &NewGrade) -> CoreResult<GradebookEntry> {
        let row = GradeRepo::upsert_entry(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn list_gradebook(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Vec<GradebookEntry>> {
        let rows = GradeRepo::list_for_offering(&self.pool, tenant_id, offering_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn student_grade_records(&self, tenant_id: DbId, student_id: DbId) -> CoreResult<Vec<GradeRecord>> {
        let rows = GradeRepo::student_records(&self.pool, tenant_id, student_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn grading_schema(&self, tenant_id: DbId) -> CoreResult<Option<GradingSchema>> {
        let row = GradeRepo::find_schema(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn set_grading_schema(&self, schema: &GradingSchema) -> CoreResult<()> {
        GradeRepo::upsert_schema(&self.pool, schema)
            .await
            .map_err(map_db_error)
    }
}
