use std::collections::HashMap;

use campus_core::error::{CoreError, CoreResult};
use campus_core::scheduling::model::{
    AcademicTerm, AvailabilityWindow, ClassSession, Cohort, CourseOffering, CourseStaff,
    NewAvailability, NewOffering, NewRoom, NewSession, NewTerm, OfferingProfile, Room,
    ScheduledSession, SessionFilter,
};
use campus_core::store::{BatchOutcome, SchedulerStore, SessionCheck};
use campus_core::types::{now, DbId};
use chrono::NaiveDate;
use sqlx::PgConnection;

use super::{try_convert, PgStore};
use crate::error::map_db_error;
use crate::repositories::{
    advisory_xact_lock, AvailabilityRepo, OfferingRepo, ReferenceRepo, SessionRepo,
};

/// Join offerings with their staff, cohorts and live enrollment counts.
async fn build_profiles(
    conn: &mut PgConnection,
    offerings: Vec<CourseOffering>,
) -> CoreResult<Vec<OfferingProfile>> {
    if offerings.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<DbId> = offerings.iter().map(|o| o.id).collect();

    let staff: Vec<CourseStaff> = try_convert(
        OfferingRepo::staff_for(&mut *conn, &ids)
            .await
            .map_err(map_db_error)?,
    )?;
    let mut staff_by_offering: HashMap<DbId, Vec<CourseStaff>> = HashMap::new();
    for s in staff {
        staff_by_offering.entry(s.offering_id).or_default().push(s);
    }

    let mut cohorts_by_offering: HashMap<DbId, Vec<DbId>> = HashMap::new();
    for (offering_id, cohort_id) in OfferingRepo::cohorts_for(&mut *conn, &ids)
        .await
        .map_err(map_db_error)?
    {
        cohorts_by_offering.entry(offering_id).or_default().push(cohort_id);
    }

    let counts: HashMap<DbId, i64> = OfferingRepo::enrollment_counts(&mut *conn, &ids)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .collect();

    Ok(offerings
        .iter()
        .map(|o| {
            OfferingProfile::from_parts(
                o,
                staff_by_offering.get(&o.id).map(Vec::as_slice).unwrap_or(&[]),
                cohorts_by_offering.remove(&o.id).unwrap_or_default(),
                counts.get(&o.id).copied().unwrap_or(0),
            )
        })
        .collect())
}

async fn profiles_for(
    conn: &mut PgConnection,
    tenant_id: DbId,
    offering_ids: &[DbId],
) -> CoreResult<HashMap<DbId, OfferingProfile>> {
    let offerings: Vec<CourseOffering> = try_convert(
        OfferingRepo::find_many(&mut *conn, tenant_id, offering_ids)
            .await
            .map_err(map_db_error)?,
    )?;
    Ok(build_profiles(conn, offerings)
        .await?
        .into_iter()
        .map(|p| (p.offering_id, p))
        .collect())
}

async fn scheduled(
    conn: &mut PgConnection,
    tenant_id: DbId,
    start: NaiveDate,
    end: NaiveDate,
) -> CoreResult<Vec<ScheduledSession>> {
    let sessions: Vec<ClassSession> = try_convert(
        SessionRepo::in_range(&mut *conn, tenant_id, start, end)
            .await
            .map_err(map_db_error)?,
    )?;
    let mut offering_ids: Vec<DbId> = sessions.iter().map(|s| s.offering_id).collect();
    offering_ids.sort_unstable();
    offering_ids.dedup();

    let profiles = profiles_for(conn, tenant_id, &offering_ids).await?;
    Ok(sessions
        .iter()
        .filter_map(|s| {
            profiles
                .get(&s.offering_id)
                .map(|p| ScheduledSession::from_session(s, p))
        })
        .collect())
}

#[async_trait::async_trait]
impl SchedulerStore for PgStore {
    async fn create_term(&self, tenant_id: DbId, input: &NewTerm) -> CoreResult<AcademicTerm> {
        let row = ReferenceRepo::create_term(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>> {
        let row = ReferenceRepo::find_term(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_terms(&self, tenant_id: DbId) -> CoreResult<Vec<AcademicTerm>> {
        let rows = ReferenceRepo::list_terms(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn close_term(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<AcademicTerm>> {
        let row = ReferenceRepo::close_term(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn create_room(&self, tenant_id: DbId, input: &NewRoom) -> CoreResult<Room> {
        let row = ReferenceRepo::create_room(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn room(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<Room>> {
        let row = ReferenceRepo::find_room(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_rooms(&self, tenant_id: DbId) -> CoreResult<Vec<Room>> {
        let rows = ReferenceRepo::list_rooms(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_cohort(&self, tenant_id: DbId, name: &str) -> CoreResult<Cohort> {
        let row = ReferenceRepo::create_cohort(&self.pool, tenant_id, name)
            .await
            .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn list_cohorts(&self, tenant_id: DbId) -> CoreResult<Vec<Cohort>> {
        let rows = ReferenceRepo::list_cohorts(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_offering(&self, tenant_id: DbId, input: &NewOffering) -> CoreResult<CourseOffering> {
        self.require("academic_terms", "term", tenant_id, input.term_id).await?;
        self.require("courses", "course", tenant_id, input.course_id).await?;
        if let Some(room_id) = input.preferred_room_id {
            self.require("rooms", "room", tenant_id, room_id).await?;
        }
        let row = OfferingRepo::create(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        CourseOffering::try_from(row)
    }

    async fn offering(&self, tenant_id: DbId, id: DbId) -> CoreResult<Option<CourseOffering>> {
        OfferingRepo::find(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)?
            .map(CourseOffering::try_from)
            .transpose()
    }

    async fn list_offerings(&self, tenant_id: DbId, term_id: Option<DbId>) -> CoreResult<Vec<CourseOffering>> {
        let rows = OfferingRepo::list(&self.pool, tenant_id, term_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn upsert_staff(&self, tenant_id: DbId, staff: &CourseStaff) -> CoreResult<CourseStaff> {
        self.require("course_offerings", "offering", tenant_id, staff.offering_id)
            .await?;
        let row = OfferingRepo::upsert_staff(&self.pool, tenant_id, staff)
            .await
            .map_err(map_db_error)?;
        CourseStaff::try_from(row)
    }

    async fn link_cohort(&self, tenant_id: DbId, offering_id: DbId, cohort_id: DbId) -> CoreResult<()> {
        self.require("course_offerings", "offering", tenant_id, offering_id)
            .await?;
        self.require("cohorts", "cohort", tenant_id, cohort_id).await?;
        OfferingRepo::link_cohort(&self.pool, tenant_id, offering_id, cohort_id)
            .await
            .map_err(map_db_error)
    }

    async fn add_availability(&self, tenant_id: DbId, input: &NewAvailability) -> CoreResult<AvailabilityWindow> {
        let row = AvailabilityRepo::create(&self.pool, tenant_id, input)
            .await
            .map_err(map_db_error)?;
        AvailabilityWindow::try_from(row)
    }

    async fn list_availability(&self, tenant_id: DbId) -> CoreResult<Vec<AvailabilityWindow>> {
        let rows = AvailabilityRepo::list(&self.pool, tenant_id)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn offering_profile(&self, tenant_id: DbId, offering_id: DbId) -> CoreResult<Option<OfferingProfile>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        let mut profiles = profiles_for(&mut conn, tenant_id, &[offering_id]).await?;
        Ok(profiles.remove(&offering_id))
    }

    async fn offering_profiles(&self, tenant_id: DbId, term_id: DbId) -> CoreResult<Vec<OfferingProfile>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        let offerings: Vec<CourseOffering> = try_convert(
            OfferingRepo::list(&mut *conn, tenant_id, Some(term_id))
                .await
                .map_err(map_db_error)?,
        )?;
        build_profiles(&mut conn, offerings).await
    }

    async fn list_sessions(&self, tenant_id: DbId, filter: &SessionFilter) -> CoreResult<Vec<ClassSession>> {
        let rows = SessionRepo::list(&self.pool, tenant_id, filter)
            .await
            .map_err(map_db_error)?;
        try_convert(rows)
    }

    async fn scheduled_sessions(
        &self,
        tenant_id: DbId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<ScheduledSession>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        scheduled(&mut conn, tenant_id, start, end).await
    }

    async fn insert_sessions_checked(
        &self,
        tenant_id: DbId,
        proposals: &[NewSession],
        check: &SessionCheck<'_>,
    ) -> CoreResult<BatchOutcome> {
        let (Some(start), Some(end)) = (
            proposals.iter().map(|p| p.date).min(),
            proposals.iter().map(|p| p.date).max(),
        ) else {
            return Ok(BatchOutcome::Inserted(Vec::new()));
        };

        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        advisory_xact_lock(&mut tx, &format!("sessions:{tenant_id}"))
            .await
            .map_err(map_db_error)?;

        let mut by_date: HashMap<NaiveDate, Vec<ScheduledSession>> = HashMap::new();
        for s in scheduled(&mut tx, tenant_id, start, end).await? {
            by_date.entry(s.date).or_default().push(s);
        }

        let mut offering_ids: Vec<DbId> = proposals.iter().map(|p| p.offering_id).collect();
        offering_ids.sort_unstable();
        offering_ids.dedup();
        let profiles = profiles_for(&mut tx, tenant_id, &offering_ids).await?;

        let mut reports = Vec::with_capacity(proposals.len());
        for (index, proposal) in proposals.iter().enumerate() {
            let profile = profiles
                .get(&proposal.offering_id)
                .ok_or_else(|| CoreError::not_found("offering", proposal.offering_id))?;
            let day = by_date.entry(proposal.date).or_default();
            let report = check(proposal, day.as_slice());
            if !report.is_clear() {
                tracing::debug!(%tenant_id, index, "Session batch rejected");
                return Ok(BatchOutcome::Rejected { index, report });
            }
            day.push(ScheduledSession::tentative(proposal, profile));
            reports.push(report);
        }

        let at = now();
        let mut inserted = Vec::with_capacity(proposals.len());
        for (proposal, report) in proposals.iter().zip(reports) {
            let row = SessionRepo::insert(&mut tx, tenant_id, proposal, at)
                .await
                .map_err(map_db_error)?;
            inserted.push((ClassSession::try_from(row)?, report));
        }

        tx.commit().await.map_err(map_db_error)?;
        tracing::info!(%tenant_id, count = inserted.len(), "Sessions created");
        Ok(BatchOutcome::Inserted(inserted))
    }

    async fn delete_session(&self, tenant_id: DbId, id: DbId) -> CoreResult<bool> {
        SessionRepo::delete(&self.pool, tenant_id, id)
            .await
            .map_err(map_db_error)
    }
}
