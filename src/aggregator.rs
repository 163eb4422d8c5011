//! Daily station aggregation
//!
//! Reduces validated hourly readings to one mean per (station, pollutant,
//! local calendar day). Day boundaries come from the configured zone, never
//! from UTC. Invalid readings are excluded from the mean; a day with no valid
//! sample produces no record at all.

use crate::clock::LocalClock;
use crate::types::{Pollutant, Reading, StationDaily};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bookkeeping for one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSummary {
    /// Distinct (station, pollutant, day) groups seen
    pub groups: usize,
    /// Groups that produced a StationDaily
    pub emitted: usize,
    /// Groups with readings but no valid sample
    pub without_valid_samples: usize,
    pub invalid_excluded: usize,
    /// Valid samples dropped because their source hour was already filled
    pub duplicates_collapsed: usize,
}

/// Aggregated station-days plus their summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregation {
    pub records: Vec<StationDaily>,
    pub summary: AggregationSummary,
}

type GroupKey = (String, Pollutant, NaiveDate);

/// Valid samples of one group, keyed by the hour the source stamped
#[derive(Default)]
struct DayAccumulator {
    hours: BTreeMap<u32, f64>,
}

impl DayAccumulator {
    /// Record a valid sample; returns false if the hour was already filled
    fn add(&mut self, hour: u32, value: f64) -> bool {
        if self.hours.contains_key(&hour) {
            return false;
        }
        self.hours.insert(hour, value);
        true
    }

    fn mean(&self) -> Option<f64> {
        if self.hours.is_empty() {
            return None;
        }
        let sum: f64 = self.hours.values().sum();
        Some(sum / self.hours.len() as f64)
    }
}

/// Aggregator bucketing readings by local calendar day
#[derive(Debug, Clone, Copy)]
pub struct DailyAggregator {
    clock: LocalClock,
}

impl DailyAggregator {
    pub fn new(clock: LocalClock) -> Self {
        Self { clock }
    }

    /// Aggregate readings into station-days, ordered by (station, pollutant, day)
    pub fn aggregate(&self, readings: &[Reading]) -> DailyAggregation {
        let mut summary = AggregationSummary::default();
        let mut groups: BTreeMap<GroupKey, DayAccumulator> = BTreeMap::new();

        for reading in readings {
            let date = self.clock.local_date(&reading.timestamp);
            let key = (reading.station_id.clone(), reading.pollutant, date);
            let accumulator = groups.entry(key).or_default();

            if !reading.valid {
                summary.invalid_excluded += 1;
                continue;
            }

            // Slot by the written hour: a gap reading moved onto the next
            // instant must not displace the real reading there
            let hour = reading.source_hour;
            if !accumulator.add(hour, reading.value) {
                debug!(
                    "duplicate sample for station {} {} on {} hour {}",
                    reading.station_id, reading.pollutant, date, hour
                );
                summary.duplicates_collapsed += 1;
            }
        }

        summary.groups = groups.len();
        let mut records = Vec::with_capacity(groups.len());
        for ((station_id, pollutant, date), accumulator) in groups {
            match accumulator.mean() {
                Some(mean) => records.push(StationDaily {
                    station_id,
                    pollutant,
                    date,
                    mean,
                    valid_hours: accumulator.hours.len() as u32,
                }),
                None => summary.without_valid_samples += 1,
            }
        }

        summary.emitted = records.len();
        info!(
            "aggregated {} readings into {} station-days ({} groups without valid samples)",
            readings.len(),
            summary.emitted,
            summary.without_valid_samples
        );

        DailyAggregation { records, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, Timelike};
    use chrono_tz::Europe::Madrid;

    fn clock() -> LocalClock {
        LocalClock::new(Madrid)
    }

    fn reading(station: &str, pollutant: Pollutant, ts: &str, value: f64, valid: bool) -> Reading {
        let naive = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M").unwrap();
        Reading {
            station_id: station.to_string(),
            pollutant_code: "8".to_string(),
            pollutant,
            timestamp: clock().localize(&naive).unwrap(),
            source_hour: naive.hour(),
            value,
            valid,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_mean_and_count_of_valid_samples() {
        let readings = vec![
            reading("4", Pollutant::No2, "2024-05-10 00:00", 10.0, true),
            reading("4", Pollutant::No2, "2024-05-10 01:00", 20.0, true),
            reading("4", Pollutant::No2, "2024-05-10 02:00", 30.0, true),
            reading("4", Pollutant::No2, "2024-05-10 03:00", 999.0, false),
        ];
        let result = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(result.records.len(), 1);
        let day = &result.records[0];
        assert_eq!(day.date, date(2024, 5, 10));
        assert_eq!(day.valid_hours, 3);
        assert!((day.mean - 20.0).abs() < 1e-12);
        assert_eq!(result.summary.invalid_excluded, 1);
    }

    #[test]
    fn test_all_invalid_day_emits_nothing() {
        let readings = vec![
            reading("4", Pollutant::Pm10, "2024-05-10 08:00", 40.0, false),
            reading("4", Pollutant::Pm10, "2024-05-10 09:00", 42.0, false),
        ];
        let result = DailyAggregator::new(clock()).aggregate(&readings);

        assert!(result.records.is_empty());
        assert_eq!(result.summary.groups, 1);
        assert_eq!(result.summary.without_valid_samples, 1);
    }

    #[test]
    fn test_local_23h_stays_on_local_day() {
        // In winter Madrid is UTC+1: local 23:00 on Jan 31 is 22:00 UTC, and
        // local 00:00 on Feb 1 is 23:00 UTC on Jan 31.
        let readings = vec![
            reading("4", Pollutant::No2, "2024-01-31 22:00", 10.0, true),
            reading("4", Pollutant::No2, "2024-01-31 23:00", 20.0, true),
            reading("4", Pollutant::No2, "2024-02-01 00:00", 50.0, true),
        ];
        let result = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].date, date(2024, 1, 31));
        assert_eq!(result.records[0].valid_hours, 2);
        assert!((result.records[0].mean - 15.0).abs() < 1e-12);
        assert_eq!(result.records[1].date, date(2024, 2, 1));
        assert_eq!(result.records[1].valid_hours, 1);
    }

    #[test]
    fn test_duplicate_hours_collapse_to_first() {
        let readings = vec![
            reading("4", Pollutant::O3, "2024-05-10 12:00", 60.0, true),
            reading("4", Pollutant::O3, "2024-05-10 12:00", 90.0, true),
            reading("4", Pollutant::O3, "2024-05-10 13:00", 70.0, true),
        ];
        let result = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(result.records[0].valid_hours, 2);
        assert!((result.records[0].mean - 65.0).abs() < 1e-12);
        assert_eq!(result.summary.duplicates_collapsed, 1);
    }

    #[test]
    fn test_full_day_has_24_samples() {
        let readings: Vec<Reading> = (0..24)
            .map(|h| {
                reading(
                    "42",
                    Pollutant::Pm25,
                    &format!("2024-05-10 {h:02}:00"),
                    h as f64,
                    true,
                )
            })
            .collect();
        let result = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].valid_hours, 24);
        assert!((result.records[0].mean - 11.5).abs() < 1e-12);
    }

    #[test]
    fn test_output_order_independent_of_input_order() {
        let mut readings = vec![
            reading("43", Pollutant::No2, "2024-05-11 05:00", 1.0, true),
            reading("4", Pollutant::Pm10, "2024-05-10 05:00", 2.0, true),
            reading("4", Pollutant::No2, "2024-05-11 05:00", 3.0, true),
            reading("4", Pollutant::No2, "2024-05-10 05:00", 4.0, true),
        ];
        let forward = DailyAggregator::new(clock()).aggregate(&readings);
        readings.reverse();
        let backward = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(forward.records, backward.records);
        let keys: Vec<(&str, Pollutant, NaiveDate)> = forward
            .records
            .iter()
            .map(|r| (r.station_id.as_str(), r.pollutant, r.date))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("4", Pollutant::Pm10, date(2024, 5, 10)),
                ("4", Pollutant::No2, date(2024, 5, 10)),
                ("4", Pollutant::No2, date(2024, 5, 11)),
                ("43", Pollutant::No2, date(2024, 5, 11)),
            ]
        );
    }

    #[test]
    fn test_spring_forward_gap_is_order_independent() {
        // 02:00 does not exist on 2024-03-31 and lands on the 03:00 instant
        let mut readings = vec![
            reading("4", Pollutant::No2, "2024-03-31 02:00", 10.0, true),
            reading("4", Pollutant::No2, "2024-03-31 03:00", 50.0, true),
        ];
        assert_eq!(readings[0].timestamp, readings[1].timestamp);

        let forward = DailyAggregator::new(clock()).aggregate(&readings);
        readings.reverse();
        let backward = DailyAggregator::new(clock()).aggregate(&readings);

        assert_eq!(forward.records, backward.records);
        assert_eq!(forward.records[0].valid_hours, 2);
        assert!((forward.records[0].mean - 30.0).abs() < 1e-12);
        assert_eq!(forward.summary.duplicates_collapsed, 0);
    }
}
