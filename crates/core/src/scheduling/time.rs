//! Wall-clock helpers shared by the detector and the solver.

use chrono::{NaiveTime, Timelike};

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` overlap iff
/// `s1 < e2 && s2 < e1`. Touching intervals do not overlap.
pub fn overlaps(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

/// Minutes between two non-overlapping intervals; `None` when they overlap.
pub fn gap_minutes(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> Option<i64> {
    if overlaps(s1, e1, s2, e2) {
        return None;
    }
    let gap = if e1 <= s2 { s2 - e1 } else { s1 - e2 };
    Some(gap.num_minutes())
}

/// Minutes since midnight.
pub fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Serde adapter for `"HH:MM"` wall-clock times. `"HH:MM:SS"` is also
/// accepted on input.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map_err(|_| format!("Invalid time '{s}', expected HH:MM"))
    }

    pub fn serialize<S: Serializer>(t: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}
