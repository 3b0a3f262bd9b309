//! Enrollments, activities, grade entries and the cumulative GPA fold.

pub mod service;

pub use service::Gradebook;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Dropped,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dropped => "dropped",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "dropped" => Some(Self::Dropped),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub student_id: DbId,
    pub status: EnrollmentStatus,
    pub enrolled_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: DbId,
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub title: String,
    pub max_score: f64,
    pub weight: f64,
    pub created_at: Timestamp,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub max_score: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl NewActivity {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::BadInput("Activity title is required".into()));
        }
        if !(self.max_score.is_finite() && self.max_score > 0.0) {
            return Err(CoreError::BadInput("max_score must be positive".into()));
        }
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(CoreError::BadInput("weight must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradebookEntry {
    pub id: DbId,
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub activity_id: DbId,
    pub student_id: DbId,
    pub score: f64,
    pub max_score: f64,
    pub grade: String,
    pub graded_by: DbId,
    pub graded_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub offering_id: DbId,
    pub activity_id: DbId,
    pub student_id: DbId,
    pub score: f64,
    pub max_score: f64,
    pub grade: String,
    pub graded_by: DbId,
}

/// One graded entry joined with what the GPA fold needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub offering_id: DbId,
    pub credits: i32,
    pub term_closed: bool,
    pub score: f64,
    pub max_score: f64,
}

// ---------------------------------------------------------------------------
// Grading schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min_percent: f64,
    pub letter: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingSchema {
    pub tenant_id: DbId,
    /// Sorted by `min_percent` descending.
    pub bands: Vec<GradeBand>,
}

impl GradingSchema {
    /// The default 4.0 scale.
    pub fn default_for(tenant_id: DbId) -> Self {
        let bands = [
            (93.0, "A", 4.0),
            (90.0, "A-", 3.67),
            (87.0, "B+", 3.33),
            (83.0, "B", 3.0),
            (80.0, "B-", 2.67),
            (77.0, "C+", 2.33),
            (73.0, "C", 2.0),
            (70.0, "C-", 1.67),
            (67.0, "D+", 1.33),
            (60.0, "D", 1.0),
            (0.0, "F", 0.0),
        ]
        .into_iter()
        .map(|(min_percent, letter, points)| GradeBand {
            min_percent,
            letter: letter.to_string(),
            points,
        })
        .collect();
        Self { tenant_id, bands }
    }

    /// Sort the bands and check they cover 0%.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        if self.bands.is_empty() {
            return Err(CoreError::BadInput("Grading schema needs at least one band".into()));
        }
        if self
            .bands
            .iter()
            .any(|b| !b.min_percent.is_finite() || !b.points.is_finite() || b.letter.trim().is_empty())
        {
            return Err(CoreError::BadInput("Grading bands need a letter and finite numbers".into()));
        }
        self.bands
            .sort_by(|a, b| b.min_percent.total_cmp(&a.min_percent));
        if self.bands.last().is_some_and(|b| b.min_percent > 0.0) {
            return Err(CoreError::BadInput("Grading schema must have a band starting at 0".into()));
        }
        Ok(self)
    }

    /// Band for a percentage in `[0, 100]`.
    pub fn band_for(&self, percent: f64) -> Option<&GradeBand> {
        self.bands.iter().find(|b| percent >= b.min_percent)
    }
}

// ---------------------------------------------------------------------------
// GPA
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferingGrade {
    pub offering_id: DbId,
    pub percent: f64,
    pub letter: String,
    pub points: f64,
    pub credits: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaSummary {
    pub student_id: DbId,
    pub gpa: Option<f64>,
    pub credits: i32,
    pub offerings: Vec<OfferingGrade>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Cumulative GPA over offerings of closed terms.
///
/// Per offering the percent is `Σscore / Σmax_score`; the GPA is
/// `Σ(points × credits) / Σcredits`. `None` when no credit-bearing
/// offering qualifies.
pub fn cumulative_gpa(student_id: DbId, records: &[GradeRecord], schema: &GradingSchema) -> GpaSummary {
    let mut per_offering: BTreeMap<DbId, (f64, f64, i32)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.term_closed) {
        let entry = per_offering.entry(r.offering_id).or_insert((0.0, 0.0, r.credits));
        entry.0 += r.score;
        entry.1 += r.max_score;
    }

    let mut offerings = Vec::new();
    let mut weighted = 0.0;
    let mut credits = 0;
    for (offering_id, (score, max, course_credits)) in per_offering {
        if max <= 0.0 {
            continue;
        }
        let percent = (score / max * 100.0).clamp(0.0, 100.0);
        let Some(band) = schema.band_for(percent) else {
            continue;
        };
        if course_credits > 0 {
            weighted += band.points * f64::from(course_credits);
            credits += course_credits;
        }
        offerings.push(OfferingGrade {
            offering_id,
            percent: round2(percent),
            letter: band.letter.clone(),
            points: band.points,
            credits: course_credits,
        });
    }

    let gpa = (credits > 0).then(|| round2(weighted / f64::from(credits)));
    GpaSummary {
        student_id,
        gpa,
        credits,
        offerings,
    }
}
