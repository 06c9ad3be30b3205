// Night record model shared between the store and the tracker.
// There is no explicit open/closed flag: a night is open while its end
// timestamp still equals its start timestamp, and closing it moves the
// end forward exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique night identifier, assigned by the store
pub type NightId = u64;

/// One tracked sleep period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Night {
    pub id: NightId,
    /// When tracking started
    pub start_time: DateTime<Utc>,
    /// Equal to `start_time` while the night is open; strictly greater
    /// once closed
    pub end_time: DateTime<Utc>,
    /// Sleep-quality rating (0..=5), recorded after the night is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<i32>,
}

impl Night {
    pub fn new(id: NightId, start: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time: start,
            end_time: start,
            quality: None,
        }
    }

    /// Open iff the end timestamp has not moved past the start
    pub fn is_open(&self) -> bool {
        self.end_time == self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_night_is_open_with_zero_duration() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
        let night = Night::new(7, start);
        assert!(night.is_open());
        assert_eq!(night.duration(), Duration::zero());
    }

    #[test]
    fn closed_night_reports_duration() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
        let mut night = Night::new(7, start);
        night.end_time = start + Duration::hours(8);
        assert!(!night.is_open());
        assert_eq!(night.duration(), Duration::hours(8));
    }

    #[test]
    fn quality_is_omitted_from_json_until_recorded() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
        let mut night = Night::new(1, start);
        let json = serde_json::to_string(&night).unwrap();
        assert!(!json.contains("quality"));

        night.quality = Some(4);
        let json = serde_json::to_string(&night).unwrap();
        let parsed: Night = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.quality, Some(4));
    }
}
