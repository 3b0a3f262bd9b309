use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::scheduling::time::hhmm;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryFormat {
    InPerson,
    Online,
    Hybrid,
}

impl DeliveryFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPerson => "IN_PERSON",
            Self::Online => "ONLINE",
            Self::Hybrid => "HYBRID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PERSON" => Some(Self::InPerson),
            "ONLINE" => Some(Self::Online),
            "HYBRID" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn needs_room(self) -> bool {
        !matches!(self, Self::Online)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Instructor,
    Ta,
    Guest,
}

impl StaffRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => "INSTRUCTOR",
            Self::Ta => "TA",
            Self::Guest => "GUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSTRUCTOR" => Some(Self::Instructor),
            "TA" => Some(Self::Ta),
            "GUEST" => Some(Self::Guest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    #[default]
    Lecture,
    Lab,
    Seminar,
    Exam,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lecture => "LECTURE",
            Self::Lab => "LAB",
            Self::Seminar => "SEMINAR",
            Self::Exam => "EXAM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LECTURE" => Some(Self::Lecture),
            "LAB" => Some(Self::Lab),
            "SEMINAR" => Some(Self::Seminar),
            "EXAM" => Some(Self::Exam),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Terms, rooms, cohorts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicTerm {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_closed: bool,
    pub created_at: Timestamp,
}

impl AcademicTerm {
    /// Every date of the term, inclusive.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |d| *d <= self.end_date)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTerm {
    pub name: String,
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_closed: bool,
}

impl NewTerm {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() || self.code.trim().is_empty() {
            return Err(CoreError::BadInput("Term name and code are required".into()));
        }
        if self.end_date < self.start_date {
            return Err(CoreError::BadInput("Term end_date must not precede start_date".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub capacity: i32,
    pub building: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub name: String,
    pub capacity: i32,
    #[serde(default)]
    pub building: Option<String>,
}

impl NewRoom {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::BadInput("Room name is required".into()));
        }
        if self.capacity <= 0 {
            return Err(CoreError::BadInput("Room capacity must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Offerings and staff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOffering {
    pub id: DbId,
    pub tenant_id: DbId,
    pub term_id: DbId,
    pub course_id: DbId,
    pub section: String,
    pub delivery_format: DeliveryFormat,
    pub capacity: i32,
    pub weekly_sessions: i32,
    pub preferred_room_id: Option<DbId>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffering {
    pub term_id: DbId,
    pub course_id: DbId,
    pub section: String,
    #[serde(default)]
    pub delivery_format: Option<DeliveryFormat>,
    pub capacity: i32,
    #[serde(default)]
    pub weekly_sessions: Option<i32>,
    #[serde(default)]
    pub preferred_room_id: Option<DbId>,
}

impl NewOffering {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.section.trim().is_empty() {
            return Err(CoreError::BadInput("Offering section is required".into()));
        }
        if self.capacity < 0 {
            return Err(CoreError::BadInput("Offering capacity must not be negative".into()));
        }
        if self.weekly_sessions.is_some_and(|n| !(1..=14).contains(&n)) {
            return Err(CoreError::BadInput("weekly_sessions must be between 1 and 14".into()));
        }
        Ok(())
    }

    pub fn delivery_format(&self) -> DeliveryFormat {
        self.delivery_format.unwrap_or(DeliveryFormat::InPerson)
    }

    pub fn weekly_sessions(&self) -> i32 {
        self.weekly_sessions.unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStaff {
    pub offering_id: DbId,
    pub user_id: DbId,
    pub role: StaffRole,
    pub is_primary: bool,
}

impl CourseStaff {
    pub fn is_primary_instructor(&self) -> bool {
        self.is_primary && self.role == StaffRole::Instructor
    }
}

/// Body of `POST /offerings/{id}/staff`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub user_id: DbId,
    pub role: StaffRole,
    #[serde(default)]
    pub is_primary: bool,
}

/// Weekly recurring availability of a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub weekday: Weekday,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub is_unavailable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAvailability {
    pub user_id: DbId,
    pub weekday: Weekday,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_unavailable: bool,
}

fn default_true() -> bool {
    true
}

impl NewAvailability {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.end_time <= self.start_time {
            return Err(CoreError::BadInput("Availability end_time must be after start_time".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: DbId,
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub room_id: Option<DbId>,
    pub session_type: SessionType,
    pub created_at: Timestamp,
}

/// A proposed session: `(offering, date, start, end, room?, type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub offering_id: DbId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room_id: Option<DbId>,
    #[serde(default)]
    pub session_type: SessionType,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.end_time <= self.start_time {
            return Err(CoreError::BadInput(format!(
                "Session end_time {} must be after start_time {}",
                self.end_time.format("%H:%M"),
                self.start_time.format("%H:%M")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub offering_id: Option<DbId>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SessionFilter {
    pub fn matches(&self, s: &ClassSession) -> bool {
        self.offering_id.map_or(true, |o| o == s.offering_id)
            && self.start.map_or(true, |d| s.date >= d)
            && self.end.map_or(true, |d| s.date <= d)
    }
}

// ---------------------------------------------------------------------------
// Detector inputs
// ---------------------------------------------------------------------------

/// Everything the detector needs to know about an offering.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferingProfile {
    pub offering_id: DbId,
    pub term_id: DbId,
    pub delivery_format: DeliveryFormat,
    pub capacity: i32,
    pub weekly_sessions: i32,
    pub preferred_room_id: Option<DbId>,
    /// Enrollment count, or the offering capacity when nobody is enrolled yet.
    pub headcount: i32,
    pub primary_instructors: Vec<DbId>,
    /// Non-primary teaching staff (TAs and secondary instructors).
    pub assistants: Vec<DbId>,
    pub cohorts: Vec<DbId>,
}

impl OfferingProfile {
    /// Build from raw rows. Guests do not count towards double-booking.
    pub fn from_parts(
        offering: &CourseOffering,
        staff: &[CourseStaff],
        cohorts: Vec<DbId>,
        enrollment_count: i64,
    ) -> Self {
        let mut primary: Vec<DbId> = staff
            .iter()
            .filter(|s| s.is_primary_instructor())
            .map(|s| s.user_id)
            .collect();
        let mut assistants: Vec<DbId> = staff
            .iter()
            .filter(|s| !s.is_primary_instructor() && s.role != StaffRole::Guest)
            .map(|s| s.user_id)
            .collect();
        let mut cohorts = cohorts;
        primary.sort_unstable();
        assistants.sort_unstable();
        cohorts.sort_unstable();
        cohorts.dedup();
        let headcount = if enrollment_count > 0 {
            i32::try_from(enrollment_count).unwrap_or(i32::MAX)
        } else {
            offering.capacity
        };
        Self {
            offering_id: offering.id,
            term_id: offering.term_id,
            delivery_format: offering.delivery_format,
            capacity: offering.capacity,
            weekly_sessions: offering.weekly_sessions,
            preferred_room_id: offering.preferred_room_id,
            headcount,
            primary_instructors: primary,
            assistants,
            cohorts,
        }
    }
}

/// An existing (or tentatively placed) session joined with its offering's
/// staff and cohorts. `session_id` is `None` for tentative placements.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSession {
    pub session_id: Option<DbId>,
    pub offering_id: DbId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room_id: Option<DbId>,
    pub primary_instructors: Vec<DbId>,
    pub assistants: Vec<DbId>,
    pub cohorts: Vec<DbId>,
}

impl ScheduledSession {
    pub fn from_session(session: &ClassSession, profile: &OfferingProfile) -> Self {
        Self {
            session_id: Some(session.id),
            offering_id: session.offering_id,
            date: session.date,
            start_time: session.start_time,
            end_time: session.end_time,
            room_id: session.room_id,
            primary_instructors: profile.primary_instructors.clone(),
            assistants: profile.assistants.clone(),
            cohorts: profile.cohorts.clone(),
        }
    }

    pub fn tentative(proposal: &NewSession, profile: &OfferingProfile) -> Self {
        Self {
            session_id: None,
            offering_id: proposal.offering_id,
            date: proposal.date,
            start_time: proposal.start_time,
            end_time: proposal.end_time,
            room_id: proposal.room_id,
            primary_instructors: profile.primary_instructors.clone(),
            assistants: profile.assistants.clone(),
            cohorts: profile.cohorts.clone(),
        }
    }
}
