//! Term, room, cohort, offering, staff, availability and session rows.

use campus_core::error::CoreError;
use campus_core::scheduling::model::{
    AcademicTerm, AvailabilityWindow, ClassSession, Cohort, CourseOffering, CourseStaff,
    DeliveryFormat, Room, SessionType, StaffRole,
};
use campus_core::types::{DbId, Timestamp};
use chrono::{NaiveDate, NaiveTime, Weekday};
use sqlx::FromRow;

use crate::error::corrupt;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Stored weekday index, Monday = 0.
pub fn weekday_index(day: Weekday) -> i16 {
    day.num_days_from_monday() as i16
}

fn weekday_from_index(index: i16) -> Result<Weekday, CoreError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| WEEKDAYS.get(i).copied())
        .ok_or_else(|| corrupt("weekday", &index.to_string()))
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct TermRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_closed: bool,
    pub created_at: Timestamp,
}

impl From<TermRow> for AcademicTerm {
    fn from(row: TermRow) -> Self {
        AcademicTerm {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            code: row.code,
            start_date: row.start_date,
            end_date: row.end_date,
            is_closed: row.is_closed,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RoomRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub capacity: i32,
    pub building: Option<String>,
    pub active: bool,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            capacity: row.capacity,
            building: row.building,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CohortRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
}

impl From<CohortRow> for Cohort {
    fn from(row: CohortRow) -> Self {
        Cohort {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Offerings and staff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct OfferingRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub term_id: DbId,
    pub course_id: DbId,
    pub section: String,
    pub delivery_format: String,
    pub capacity: i32,
    pub weekly_sessions: i32,
    pub preferred_room_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl TryFrom<OfferingRow> for CourseOffering {
    type Error = CoreError;

    fn try_from(row: OfferingRow) -> Result<Self, Self::Error> {
        let delivery_format = DeliveryFormat::parse(&row.delivery_format)
            .ok_or_else(|| corrupt("delivery format", &row.delivery_format))?;
        Ok(CourseOffering {
            id: row.id,
            tenant_id: row.tenant_id,
            term_id: row.term_id,
            course_id: row.course_id,
            section: row.section,
            delivery_format,
            capacity: row.capacity,
            weekly_sessions: row.weekly_sessions,
            preferred_room_id: row.preferred_room_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StaffRow {
    pub offering_id: DbId,
    pub user_id: DbId,
    pub role: String,
    pub is_primary: bool,
}

impl TryFrom<StaffRow> for CourseStaff {
    type Error = CoreError;

    fn try_from(row: StaffRow) -> Result<Self, Self::Error> {
        let role = StaffRole::parse(&row.role).ok_or_else(|| corrupt("staff role", &row.role))?;
        Ok(CourseStaff {
            offering_id: row.offering_id,
            user_id: row.user_id,
            role,
            is_primary: row.is_primary,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AvailabilityRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_unavailable: bool,
}

impl TryFrom<AvailabilityRow> for AvailabilityWindow {
    type Error = CoreError;

    fn try_from(row: AvailabilityRow) -> Result<Self, Self::Error> {
        Ok(AvailabilityWindow {
            weekday: weekday_from_index(row.weekday)?,
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            start_time: row.start_time,
            end_time: row.end_time,
            is_unavailable: row.is_unavailable,
        })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room_id: Option<DbId>,
    pub session_type: String,
    pub created_at: Timestamp,
}

impl TryFrom<SessionRow> for ClassSession {
    type Error = CoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let session_type = SessionType::parse(&row.session_type)
            .ok_or_else(|| corrupt("session type", &row.session_type))?;
        Ok(ClassSession {
            id: row.id,
            tenant_id: row.tenant_id,
            offering_id: row.offering_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            room_id: row.room_id,
            session_type,
            created_at: row.created_at,
        })
    }
}
