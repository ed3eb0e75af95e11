//! Sample window selection.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One space-time draw: the anchor timestamp of a training sample.
///
/// The anchor minute always lands on the 5-minute grid; the hour comes from
/// one of the day's time sections, so draws from different sections of the
/// same day can never share a directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub anchor: DateTime<Utc>,
}

impl SampleWindow {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self { anchor }
    }

    /// Draw a candidate inside one time section of a day.
    ///
    /// The day is split into `sections` equal spans (sections should divide
    /// 24); the hour is uniform within span `section` and the minute is
    /// `5 * uniform(0..12)`.
    pub fn draw<R: Rng + ?Sized>(
        rng: &mut R,
        day: NaiveDate,
        section: u32,
        sections: u32,
    ) -> Self {
        let span = 24 / sections.max(1);
        let hour = rng.gen_range(section * span..(section + 1) * span);
        let minute = rng.gen_range(0u32..12) * 5;
        let midnight = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        Self::new(midnight + Duration::hours(i64::from(hour)) + Duration::minutes(i64::from(minute)))
    }

    /// Directory name for this sample: `YYYYMMDD_HHMM`.
    pub fn dir_name(&self) -> String {
        self.anchor.format("%Y%m%d_%H%M").to_string()
    }

    /// Human-readable timestamp used in warning lines: `YYYY-MM-DD HH:MM`.
    pub fn display_time(&self) -> String {
        self.anchor.format("%Y-%m-%d %H:%M").to_string()
    }

    /// Predictor time axis: the hour leading up to the anchor, 13 steps of
    /// 5 minutes ending at the anchor itself.
    pub fn inputs_axis(&self) -> Vec<DateTime<Utc>> {
        (0..13)
            .map(|i| self.anchor - Duration::minutes(60) + Duration::minutes(5 * i))
            .collect()
    }

    /// Label time axis: the hour after the anchor, 13 steps of 5 minutes
    /// starting 5 minutes in.
    pub fn radar_axis(&self) -> Vec<DateTime<Utc>> {
        (0..13)
            .map(|i| self.anchor + Duration::minutes(5 + 5 * i))
            .collect()
    }
}
