use chrono::SubsecRound;

/// All primary keys are UUIDs (v7, time ordered when generated here).
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh primary key.
pub fn new_id() -> DbId {
    uuid::Uuid::now_v7()
}

/// Current UTC instant at microsecond precision, matching `TIMESTAMPTZ`.
pub fn now() -> Timestamp {
    chrono::Utc::now().trunc_subsecs(6)
}
