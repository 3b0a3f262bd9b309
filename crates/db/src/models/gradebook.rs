//! Enrollment, activity, gradebook and grading schema rows.

use campus_core::error::CoreError;
use campus_core::gradebook::{
    Activity, Enrollment, EnrollmentStatus, GradeBand, GradeRecord, GradebookEntry, GradingSchema,
};
use campus_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::corrupt;

#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentRow {
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub student_id: DbId,
    pub status: String,
    pub enrolled_at: Timestamp,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = CoreError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        let status = EnrollmentStatus::parse(&row.status)
            .ok_or_else(|| corrupt("enrollment status", &row.status))?;
        Ok(Enrollment {
            tenant_id: row.tenant_id,
            offering_id: row.offering_id,
            student_id: row.student_id,
            status,
            enrolled_at: row.enrolled_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub offering_id: DbId,
    pub title: String,
    pub max_score: f64,
    pub weight: f64,
    pub created_at: Timestamp,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Activity {
            id: row.id,
            tenant_id: row.tenant_id,
            offering_id: row.offering_id,
            title: row.title,
            max_score: row.max_score,
            weight: row.weight,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GradebookEntryRow {
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

impl From<GradebookEntryRow> for GradebookEntry {
    fn from(row: GradebookEntryRow) -> Self {
        GradebookEntry {
            id: row.id,
            tenant_id: row.tenant_id,
            offering_id: row.offering_id,
            activity_id: row.activity_id,
            student_id: row.student_id,
            score: row.score,
            max_score: row.max_score,
            grade: row.grade,
            graded_by: row.graded_by,
            graded_at: row.graded_at,
        }
    }
}

/// A graded entry joined with course credits and the term's closed flag.
#[derive(Debug, Clone, FromRow)]
pub struct GradeRecordRow {
    pub offering_id: DbId,
    pub credits: i32,
    pub term_closed: bool,
    pub score: f64,
    pub max_score: f64,
}

impl From<GradeRecordRow> for GradeRecord {
    fn from(row: GradeRecordRow) -> Self {
        GradeRecord {
            offering_id: row.offering_id,
            credits: row.credits,
            term_closed: row.term_closed,
            score: row.score,
            max_score: row.max_score,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GradingSchemaRow {
    pub tenant_id: DbId,
    pub bands: Json<Vec<GradeBand>>,
}

impl From<GradingSchemaRow> for GradingSchema {
    fn from(row: GradingSchemaRow) -> Self {
        GradingSchema {
            tenant_id: row.tenant_id,
            bands: row.bands.0,
        }
    }
}
