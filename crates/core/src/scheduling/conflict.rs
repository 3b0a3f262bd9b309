//! Session conflict detection.
//!
//! [`detect`] is a pure function over the proposal and an injected set of
//! existing sessions. Both `create_session` and the solver use it as their
//! feasibility oracle.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::scheduling::model::{
    AvailabilityWindow, DeliveryFormat, NewSession, OfferingProfile, Room, ScheduledSession,
};
use crate::scheduling::time;
use crate::types::DbId;

/// Minimum gap between two sessions of the same primary instructor before a
/// `back_to_back` warning is raised.
pub const BACK_TO_BACK_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Instructor,
    Room,
    Cohort,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::Room => "room",
            Self::Cohort => "cohort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardConflict {
    pub kind: ConflictKind,
    pub session_id: Option<DbId>,
    pub offering_id: DbId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    TaDoubleBooked,
    Capacity,
    BackToBack,
    FormatMismatch,
    InstructorUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<DbId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub hard: Vec<HardConflict>,
    pub warnings: Vec<Warning>,
}

impl ConflictReport {
    pub fn is_clear(&self) -> bool {
        self.hard.is_empty()
    }

    /// Kind of the first hard conflict, used as the `reason` of a 409.
    pub fn reason(&self) -> Option<ConflictKind> {
        self.hard.first().map(|c| c.kind)
    }

    /// Distinct ids of persisted sessions involved in hard conflicts.
    pub fn offenders(&self) -> Vec<DbId> {
        let mut ids: Vec<DbId> = Vec::new();
        for c in &self.hard {
            if let Some(id) = c.session_id {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

fn intersects(a: &[DbId], b: &[DbId]) -> bool {
    a.iter().any(|x| b.contains(x))
}

/// A primary instructor on either side is staffed, in any role, on the other.
///
/// Symmetric, so the outcome does not depend on which session came first.
fn instructor_clash(profile: &OfferingProfile, other: &ScheduledSession) -> bool {
    let staffed = |primary: &[DbId], assistants: &[DbId], id: &DbId| {
        primary.contains(id) || assistants.contains(id)
    };
    profile
        .primary_instructors
        .iter()
        .any(|i| staffed(&other.primary_instructors, &other.assistants, i))
        || other
            .primary_instructors
            .iter()
            .any(|i| staffed(&profile.primary_instructors, &profile.assistants, i))
}

/// True when `user_id` cannot teach on `date` during `[start, end)`.
///
/// Blocked when the interval overlaps an unavailability window, or when the
/// user declared availability windows for that weekday and none of them
/// contains the interval.
pub fn instructor_blocked(
    windows: &[AvailabilityWindow],
    user_id: DbId,
    date: chrono::NaiveDate,
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
) -> bool {
    let weekday = date.weekday();
    let mut declared_available = false;
    let mut inside_available = false;
    for w in windows.iter().filter(|w| w.user_id == user_id && w.weekday == weekday) {
        if w.is_unavailable {
            if time::overlaps(start, end, w.start_time, w.end_time) {
                return true;
            }
        } else {
            declared_available = true;
            if w.start_time <= start && end <= w.end_time {
                inside_available = true;
            }
        }
    }
    declared_available && !inside_available
}

/// Evaluate `proposal` against `existing` sessions of the same tenant.
///
/// Sessions on other dates and the session being proposed itself are
/// ignored. Hard conflicts are reported in the order of `existing`.
pub fn detect(
    proposal: &NewSession,
    profile: &OfferingProfile,
    room: Option<&Room>,
    existing: &[ScheduledSession],
    availability: &[AvailabilityWindow],
) -> ConflictReport {
    let mut report = ConflictReport::default();
    let (start, end) = (proposal.start_time, proposal.end_time);

    for other in existing.iter().filter(|s| s.date == proposal.date) {
        let overlapping = time::overlaps(start, end, other.start_time, other.end_time);

        if overlapping {
            if instructor_clash(profile, other) {
                report.hard.push(HardConflict {
                    kind: ConflictKind::Instructor,
                    session_id: other.session_id,
                    offering_id: other.offering_id,
                });
            } else if intersects(&profile.assistants, &other.assistants) {
                report.warnings.push(Warning {
                    kind: WarningKind::TaDoubleBooked,
                    message: "A teaching assistant is booked in an overlapping session".into(),
                    session_id: other.session_id,
                });
            }
            if proposal.room_id.is_some() && proposal.room_id == other.room_id {
                report.hard.push(HardConflict {
                    kind: ConflictKind::Room,
                    session_id: other.session_id,
                    offering_id: other.offering_id,
                });
            }
            if other.offering_id != proposal.offering_id
                && intersects(&profile.cohorts, &other.cohorts)
            {
                report.hard.push(HardConflict {
                    kind: ConflictKind::Cohort,
                    session_id: other.session_id,
                    offering_id: other.offering_id,
                });
            }
        } else if intersects(&profile.primary_instructors, &other.primary_instructors) {
            let gap = time::gap_minutes(start, end, other.start_time, other.end_time);
            if gap.is_some_and(|g| g < BACK_TO_BACK_MINUTES) {
                report.warnings.push(Warning {
                    kind: WarningKind::BackToBack,
                    message: format!(
                        "Instructor has less than {BACK_TO_BACK_MINUTES} minutes between sessions"
                    ),
                    session_id: other.session_id,
                });
            }
        }
    }

    if let Some(room) = room {
        if profile.headcount > room.capacity {
            report.warnings.push(Warning {
                kind: WarningKind::Capacity,
                message: format!(
                    "Headcount {} exceeds capacity {} of room '{}'",
                    profile.headcount, room.capacity, room.name
                ),
                session_id: None,
            });
        }
    }

    match (profile.delivery_format, proposal.room_id) {
        (DeliveryFormat::Online, Some(_)) => report.warnings.push(Warning {
            kind: WarningKind::FormatMismatch,
            message: "Online offering scheduled into a room".into(),
            session_id: None,
        }),
        (DeliveryFormat::InPerson, None) => report.warnings.push(Warning {
            kind: WarningKind::FormatMismatch,
            message: "In-person offering scheduled without a room".into(),
            session_id: None,
        }),
        _ => {}
    }

    for instructor in &profile.primary_instructors {
        if instructor_blocked(availability, *instructor, proposal.date, start, end) {
            report.warnings.push(Warning {
                kind: WarningKind::InstructorUnavailable,
                message: format!("Instructor {instructor} is unavailable at this time"),
                session_id: None,
            });
        }
    }

    report
}
