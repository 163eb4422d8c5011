//! Local clock handling
//!
//! Readings are stored as UTC instants but bucketed by the local calendar day
//! of the configured zone. Naive timestamps coming from ingestion are
//! interpreted as local wall-clock time.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Accepted layouts for naive (zone-less) local timestamps
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// An hourly timestamp resolved to an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyStamp {
    pub instant: DateTime<Utc>,
    /// Local hour (0-23) as stamped by the source
    pub wall_hour: u32,
}

/// Converts between UTC instants and local wall-clock time in one zone
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    tz: Tz,
}

impl LocalClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Parse an hourly timestamp.
    ///
    /// RFC 3339 strings carry their own offset; naive strings are localized in
    /// this clock's zone. Returns `None` for unparseable text and for
    /// timestamps that do not sit on a local hour boundary.
    pub fn parse_hourly(&self, text: &str) -> Option<DateTime<Utc>> {
        self.parse_stamp(text).map(|stamp| stamp.instant)
    }

    /// Parse an hourly timestamp, keeping the wall-clock hour the source wrote.
    ///
    /// For naive text the hour is taken as written, so a reading stamped in a
    /// spring-forward gap keeps its own slot even though its instant moves.
    pub fn parse_stamp(&self, text: &str) -> Option<HourlyStamp> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            let instant = dt.with_timezone(&Utc);
            let local = instant.with_timezone(&self.tz);
            if local.minute() != 0 || local.second() != 0 || local.nanosecond() != 0 {
                return None;
            }
            return Some(HourlyStamp {
                instant,
                wall_hour: self.local_hour(&instant),
            });
        }

        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?;
        if naive.minute() != 0 || naive.second() != 0 || naive.nanosecond() != 0 {
            return None;
        }
        Some(HourlyStamp {
            instant: self.localize(&naive)?,
            wall_hour: naive.hour(),
        })
    }

    /// Interpret a naive local time.
    ///
    /// Times skipped by a forward DST transition are shifted forward by the
    /// gap; times repeated by a backward transition resolve to the earlier
    /// instant.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(naive) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                let shifted = *naive + chrono::Duration::hours(1);
                match self.tz.from_local_datetime(&shifted) {
                    LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                    LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
                    LocalResult::None => None,
                }
            }
        }
    }

    /// Local calendar day of an instant
    pub fn local_date(&self, instant: &DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Local clock hour (0-23) of an instant
    pub fn local_hour(&self, instant: &DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.tz).hour()
    }
}
