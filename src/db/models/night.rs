//! Sleep night data models.
//!
//! A night is open while `end_time_milli == start_time_milli`; there is no nullable end
//! column, the equality itself is the marker.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Stored in `quality_rating` until the user rates the night.
pub const QUALITY_UNSET: i32 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SleepQuality {
    VeryBad,
    Poor,
    SoSo,
    Ok,
    PrettyGood,
    Excellent,
}

impl SleepQuality {
    pub fn from_rating(value: i32) -> Option<Self> {
        match value {
            0 => Some(SleepQuality::VeryBad),
            1 => Some(SleepQuality::Poor),
            2 => Some(SleepQuality::SoSo),
            3 => Some(SleepQuality::Ok),
            4 => Some(SleepQuality::PrettyGood),
            5 => Some(SleepQuality::Excellent),
            _ => None,
        }
    }

    pub fn rating(&self) -> i32 {
        match self {
            SleepQuality::VeryBad => 0,
            SleepQuality::Poor => 1,
            SleepQuality::SoSo => 2,
            SleepQuality::Ok => 3,
            SleepQuality::PrettyGood => 4,
            SleepQuality::Excellent => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepQuality::VeryBad => "Very bad",
            SleepQuality::Poor => "Poor",
            SleepQuality::SoSo => "So-so",
            SleepQuality::Ok => "OK",
            SleepQuality::PrettyGood => "Pretty good",
            SleepQuality::Excellent => "Excellent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Assigned by the store; `0` until inserted.
    pub id: i64,
    pub start_time_milli: i64,
    pub end_time_milli: i64,
    pub quality_rating: i32,
}

impl SessionRecord {
    pub fn begin(now_milli: i64) -> Self {
        Self {
            id: 0,
            start_time_milli: now_milli,
            end_time_milli: now_milli,
            quality_rating: QUALITY_UNSET,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time_milli == self.start_time_milli
    }

    pub fn quality(&self) -> Option<SleepQuality> {
        SleepQuality::from_rating(self.quality_rating)
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.end_time_milli - self.start_time_milli)
    }
}

/// Display-ready projection of a stored night.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NightSummary {
    pub id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub quality: Option<SleepQuality>,
    pub open: bool,
}

impl From<&SessionRecord> for NightSummary {
    fn from(record: &SessionRecord) -> Self {
        let open = record.is_open();
        Self {
            id: record.id,
            started_at: Utc.timestamp_millis_opt(record.start_time_milli).single(),
            ended_at: if open {
                None
            } else {
                Utc.timestamp_millis_opt(record.end_time_milli).single()
            },
            duration_ms: record.duration().num_milliseconds(),
            quality: record.quality(),
            open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_open_and_unrated() {
        let record = SessionRecord::begin(1_000);
        assert!(record.is_open());
        assert_eq!(record.quality_rating, QUALITY_UNSET);
        assert_eq!(record.quality(), None);
        assert_eq!(record.duration(), Duration::zero());
    }

    #[test]
    fn differing_end_time_closes_record() {
        let mut record = SessionRecord::begin(1_000);
        record.end_time_milli = 2_000;
        assert!(!record.is_open());
        assert_eq!(record.duration().num_milliseconds(), 1_000);
    }

    #[test]
    fn quality_ratings_map_to_ordinals() {
        assert_eq!(SleepQuality::from_rating(0), Some(SleepQuality::VeryBad));
        assert_eq!(SleepQuality::from_rating(5), Some(SleepQuality::Excellent));
        assert_eq!(SleepQuality::from_rating(6), None);
        assert_eq!(SleepQuality::from_rating(QUALITY_UNSET), None);
        assert_eq!(SleepQuality::PrettyGood.rating(), 4);
    }

    #[test]
    fn summary_hides_end_of_open_night() {
        let open = SessionRecord {
            id: 3,
            ..SessionRecord::begin(1_700_000_000_000)
        };
        let summary = NightSummary::from(&open);
        assert!(summary.open);
        assert!(summary.started_at.is_some());
        assert_eq!(summary.ended_at, None);

        let closed = SessionRecord {
            end_time_milli: 1_700_000_600_000,
            quality_rating: 3,
            ..open
        };
        let summary = NightSummary::from(&closed);
        assert!(!summary.open);
        assert_eq!(summary.duration_ms, 600_000);
        assert_eq!(summary.quality, Some(SleepQuality::Ok));
        assert!(summary.ended_at.is_some());
    }
}
