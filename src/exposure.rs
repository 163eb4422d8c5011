//! Coverage-gated exposure
//!
//! Joins each school's matched station to that station's daily aggregates and
//! emits an exposure only for station-days that meet the coverage gate. A
//! station-day below the gate leaves no trace in the output. Neither does one
//! whose mean lies outside the pollutant's physical bounds.

use crate::config::CoveragePolicy;
use crate::types::{SchoolExposureDaily, SchoolStationMatch, StationDaily};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bookkeeping for one exposure pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureSummary {
    /// School/station-day pairs considered
    pub candidates: usize,
    pub emitted: usize,
    /// Pairs withheld by the coverage gate
    pub suppressed: usize,
    /// Pairs withheld because the mean is physically implausible
    pub out_of_bounds: usize,
}

/// Emitted exposures plus their summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureResult {
    pub records: Vec<SchoolExposureDaily>,
    pub summary: ExposureSummary,
}

/// Calculator applying the coverage gate to matched station-days
#[derive(Debug, Clone, Copy)]
pub struct ExposureCalculator {
    policy: CoveragePolicy,
}

impl ExposureCalculator {
    pub fn new(policy: CoveragePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CoveragePolicy {
        &self.policy
    }

    /// Compute daily exposures, ordered by (school, pollutant, day)
    pub fn compute(
        &self,
        matches: &[SchoolStationMatch],
        daily: &[StationDaily],
    ) -> ExposureResult {
        let mut by_station: BTreeMap<&str, Vec<&StationDaily>> = BTreeMap::new();
        for record in daily {
            by_station
                .entry(record.station_id.as_str())
                .or_default()
                .push(record);
        }

        let mut summary = ExposureSummary::default();
        let mut records = Vec::new();

        for m in matches {
            let Some(station_days) = by_station.get(m.station_id.as_str()) else {
                continue;
            };

            for day in station_days {
                summary.candidates += 1;
                if !self.policy.admits(day.valid_hours) {
                    summary.suppressed += 1;
                    continue;
                }

                let (lo, hi) = day.pollutant.physical_bounds();
                if !day.mean.is_finite() || day.mean < lo || day.mean > hi {
                    debug!(
                        "withholding {} {} on {} for school {}: mean {} outside {}..={}",
                        m.station_id, day.pollutant, day.date, m.school_id, day.mean, lo, hi
                    );
                    summary.out_of_bounds += 1;
                    continue;
                }

                records.push(SchoolExposureDaily {
                    school_id: m.school_id.clone(),
                    station_id: m.station_id.clone(),
                    pollutant: day.pollutant,
                    date: day.date,
                    value: day.mean,
                    valid_hours: day.valid_hours,
                    coverage: self.policy.fraction(day.valid_hours),
                });
            }
        }

        records.sort_by(|a, b| {
            (a.school_id.as_str(), a.pollutant, a.date).cmp(&(b.school_id.as_str(), b.pollutant, b.date))
        });

        summary.emitted = records.len();
        info!(
            "emitted {} daily exposures, {} suppressed below coverage {}, {} out of bounds",
            summary.emitted, summary.suppressed, self.policy.min_fraction, summary.out_of_bounds
        );

        ExposureResult { records, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pollutant;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn day(station: &str, pollutant: Pollutant, d: u32, mean: f64, valid_hours: u32) -> StationDaily {
        StationDaily {
            station_id: station.to_string(),
            pollutant,
            date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            mean,
            valid_hours,
        }
    }

    fn matched(school: &str, station: &str) -> SchoolStationMatch {
        SchoolStationMatch {
            school_id: school.to_string(),
            station_id: station.to_string(),
            distance_m: 1_250.0,
        }
    }

    #[test]
    fn test_18_of_24_passes_and_17_fails() {
        let calculator = ExposureCalculator::new(CoveragePolicy::default());
        let daily = vec![
            day("4", Pollutant::No2, 10, 30.0, 18),
            day("4", Pollutant::No2, 11, 35.0, 17),
        ];
        let result = calculator.compute(&[matched("s1", "4")], &daily);

        assert_eq!(result.records.len(), 1);
        let exposure = &result.records[0];
        assert_eq!(exposure.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(exposure.coverage, 0.75);
        assert_eq!(exposure.value, 30.0);
        assert_eq!(result.summary.suppressed, 1);
    }

    #[test]
    fn test_value_copied_from_matched_station_only() {
        let calculator = ExposureCalculator::new(CoveragePolicy::default());
        let daily = vec![
            day("4", Pollutant::Pm10, 10, 22.0, 24),
            day("42", Pollutant::Pm10, 10, 80.0, 24),
        ];
        let matches = vec![matched("s1", "42"), matched("s2", "4")];
        let result = calculator.compute(&matches, &daily);

        let got: Vec<(&str, &str, f64)> = result
            .records
            .iter()
            .map(|r| (r.school_id.as_str(), r.station_id.as_str(), r.value))
            .collect();
        assert_eq!(got, vec![("s1", "42", 80.0), ("s2", "4", 22.0)]);
    }

    #[test]
    fn test_station_without_data_yields_absence() {
        let calculator = ExposureCalculator::new(CoveragePolicy::default());
        let daily = vec![day("4", Pollutant::O3, 10, 60.0, 24)];
        let result = calculator.compute(&[matched("s1", "99")], &daily);

        assert!(result.records.is_empty());
        assert_eq!(result.summary.candidates, 0);
    }

    #[test]
    fn test_threshold_is_a_single_parameter() {
        let calculator = ExposureCalculator::new(CoveragePolicy {
            min_fraction: 0.5,
            ..Default::default()
        });
        let daily = vec![day("4", Pollutant::No2, 10, 30.0, 12), day("4", Pollutant::No2, 11, 30.0, 11)];
        let result = calculator.compute(&[matched("s1", "4")], &daily);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].coverage, 0.5);
    }

    #[test]
    fn test_output_sorted_by_school_pollutant_day() {
        let calculator = ExposureCalculator::new(CoveragePolicy::default());
        let daily = vec![
            day("4", Pollutant::Pm10, 11, 1.0, 24),
            day("4", Pollutant::Pm10, 10, 2.0, 24),
            day("4", Pollutant::No2, 10, 3.0, 24),
        ];
        let matches = vec![matched("s2", "4"), matched("s1", "4")];
        let result = calculator.compute(&matches, &daily);

        let keys: Vec<(&str, Pollutant, u32)> = result
            .records
            .iter()
            .map(|r| (r.school_id.as_str(), r.pollutant, chrono::Datelike::day(&r.date)))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("s1", Pollutant::Pm10, 10),
                ("s1", Pollutant::Pm10, 11),
                ("s1", Pollutant::No2, 10),
                ("s2", Pollutant::Pm10, 10),
                ("s2", Pollutant::Pm10, 11),
                ("s2", Pollutant::No2, 10),
            ]
        );
    }

    #[test]
    fn test_out_of_bounds_mean_is_withheld() {
        let calculator = ExposureCalculator::new(CoveragePolicy::default());
        let daily = vec![
            day("4", Pollutant::Pm10, 10, 30.0, 24),
            day("4", Pollutant::Pm10, 11, 450.0, 24),
            day("4", Pollutant::Pm10, 12, 400.0, 24),
        ];
        let result = calculator.compute(&[matched("s1", "4")], &daily);

        let values: Vec<f64> = result.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![30.0, 400.0]);
        assert_eq!(result.summary.out_of_bounds, 1);
        assert_eq!(result.summary.suppressed, 0);
    }
}
