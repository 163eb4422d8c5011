//! QC and acceptance
//!
//! Computes distance statistics over the school matches and the completeness
//! of the emitted exposures, then runs the acceptance checks. The report
//! names every check and its status so a failing run can be diagnosed without
//! re-running the pipeline.

use crate::config::{AcceptanceCriteria, CoveragePolicy};
use crate::registry::SchoolRegistry;
use crate::types::{Pollutant, SchoolExposureDaily, SchoolStationMatch, StationDaily};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of identifiers quoted in a check message
const MAX_LISTED_IDS: usize = 10;

/// Overall acceptance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    /// Reported, does not fail the run
    Warning,
    Error,
}

/// One named acceptance check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl QcCheck {
    fn new(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

/// Distribution of match distances (meters)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceStats {
    /// Finite distances the statistics were computed over
    pub count: usize,
    pub median_m: Option<f64>,
    pub p95_m: Option<f64>,
    pub max_m: Option<f64>,
    /// Matches farther than the outlier distance
    pub beyond_outlier: usize,
}

/// Emitted versus expected school/pollutant/day cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub schools: usize,
    pub pollutants: Vec<Pollutant>,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub days: usize,
    pub expected: usize,
    pub emitted: usize,
    pub ratio: f64,
}

/// Structured acceptance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub verdict: Verdict,
    pub distance: DistanceStats,
    pub completeness: Completeness,
    pub checks: Vec<QcCheck>,
    /// Names of the checks with error status
    pub failed_checks: Vec<String>,
}

impl QcReport {
    /// Whether the dataset may be promoted downstream
    pub fn accepted(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn check(&self, name: &str) -> Option<&QcCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Everything the QC stage inspects
pub struct QcInput<'a> {
    pub schools: &'a SchoolRegistry,
    pub matches: &'a [SchoolStationMatch],
    pub daily: &'a [StationDaily],
    pub exposures: &'a [SchoolExposureDaily],
    /// Station-day means the exposure stage withheld as implausible
    pub withheld_out_of_bounds: usize,
}

/// Acceptance engine
#[derive(Debug, Clone, Copy)]
pub struct QcEngine {
    criteria: AcceptanceCriteria,
    coverage: CoveragePolicy,
}

impl QcEngine {
    pub fn new(criteria: AcceptanceCriteria, coverage: CoveragePolicy) -> Self {
        Self { criteria, coverage }
    }

    /// Run all checks and build the report
    pub fn evaluate(&self, input: &QcInput<'_>) -> QcReport {
        let distance = distance_stats(input.matches, self.criteria.outlier_distance_m);
        let completeness = completeness(input.schools.len(), input.daily, input.exposures);

        let checks = vec![
            self.check_match_cardinality(input),
            self.check_match_distance(input.matches),
            self.check_completeness(&completeness),
            self.check_coverage_gate(input.exposures),
            self.check_daily_sample_counts(input.daily),
            self.check_value_bounds(input.exposures, input.withheld_out_of_bounds),
            self.check_distance_outliers(&distance),
        ];

        let failed_checks: Vec<String> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Error)
            .map(|c| c.name.clone())
            .collect();

        let verdict = if failed_checks.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        for check in &checks {
            if check.status != CheckStatus::Ok {
                warn!("qc {} [{:?}]: {}", check.name, check.status, check.message);
            }
        }
        info!(
            "qc verdict {:?}: completeness {:.4}, median distance {:?} m",
            verdict, completeness.ratio, distance.median_m
        );

        QcReport {
            verdict,
            distance,
            completeness,
            checks,
            failed_checks,
        }
    }

    fn check_match_cardinality(&self, input: &QcInput<'_>) -> QcCheck {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for m in input.matches {
            *counts.entry(m.school_id.as_str()).or_insert(0) += 1;
        }

        let missing: Vec<&str> = input
            .schools
            .ids()
            .filter(|id| !counts.contains_key(id))
            .collect();
        let duplicated: Vec<&str> = counts
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(id, _)| *id)
            .collect();
        let unknown: Vec<&str> = counts
            .keys()
            .copied()
            .filter(|id| !input.schools.contains(id))
            .collect();

        if missing.is_empty() && duplicated.is_empty() && unknown.is_empty() {
            return QcCheck::new(
                "match_cardinality",
                CheckStatus::Ok,
                format!("all {} schools have exactly one match", input.schools.len()),
            );
        }

        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("{} without match [{}]", missing.len(), list_ids(&missing)));
        }
        if !duplicated.is_empty() {
            problems.push(format!(
                "{} with multiple matches [{}]",
                duplicated.len(),
                list_ids(&duplicated)
            ));
        }
        if !unknown.is_empty() {
            problems.push(format!(
                "{} matches for unknown schools [{}]",
                unknown.len(),
                list_ids(&unknown)
            ));
        }
        QcCheck::new("match_cardinality", CheckStatus::Error, problems.join("; "))
    }

    fn check_match_distance(&self, matches: &[SchoolStationMatch]) -> QcCheck {
        let bad: Vec<&str> = matches
            .iter()
            .filter(|m| !m.distance_m.is_finite() || m.distance_m < 0.0)
            .map(|m| m.school_id.as_str())
            .collect();

        if bad.is_empty() {
            QcCheck::new(
                "match_distance",
                CheckStatus::Ok,
                "all match distances are finite and non-negative".to_string(),
            )
        } else {
            QcCheck::new(
                "match_distance",
                CheckStatus::Error,
                format!(
                    "{} matches with non-finite or negative distance [{}]",
                    bad.len(),
                    list_ids(&bad)
                ),
            )
        }
    }

    fn check_completeness(&self, completeness: &Completeness) -> QcCheck {
        let min = self.criteria.min_completeness;
        let message = format!(
            "{} of {} expected cells emitted (ratio {:.4}, minimum {:.4})",
            completeness.emitted, completeness.expected, completeness.ratio, min
        );
        let status = if completeness.ratio > min {
            CheckStatus::Ok
        } else {
            CheckStatus::Error
        };
        QcCheck::new("completeness", status, message)
    }

    fn check_coverage_gate(&self, exposures: &[SchoolExposureDaily]) -> QcCheck {
        let below = exposures
            .iter()
            .filter(|e| e.coverage < self.coverage.min_fraction)
            .count();
        if below == 0 {
            QcCheck::new(
                "coverage_gate",
                CheckStatus::Ok,
                format!("all exposures have coverage >= {}", self.coverage.min_fraction),
            )
        } else {
            QcCheck::new(
                "coverage_gate",
                CheckStatus::Error,
                format!(
                    "{} exposures below coverage {}",
                    below, self.coverage.min_fraction
                ),
            )
        }
    }

    fn check_daily_sample_counts(&self, daily: &[StationDaily]) -> QcCheck {
        let slots = self.coverage.slots_per_day;
        let bad = daily
            .iter()
            .filter(|d| d.valid_hours == 0 || d.valid_hours > slots)
            .count();
        if bad == 0 {
            QcCheck::new(
                "daily_sample_counts",
                CheckStatus::Ok,
                format!("all station-days hold 1..={slots} samples"),
            )
        } else {
            QcCheck::new(
                "daily_sample_counts",
                CheckStatus::Error,
                format!("{bad} station-days outside 1..={slots} samples"),
            )
        }
    }

    /// Emitted values out of bounds fail the run; withheld ones only warn
    fn check_value_bounds(&self, exposures: &[SchoolExposureDaily], withheld: usize) -> QcCheck {
        let mut out_of_bounds: BTreeMap<Pollutant, usize> = BTreeMap::new();
        for e in exposures {
            let (lo, hi) = e.pollutant.physical_bounds();
            if !e.value.is_finite() || e.value < lo || e.value > hi {
                *out_of_bounds.entry(e.pollutant).or_insert(0) += 1;
            }
        }

        if out_of_bounds.is_empty() && withheld == 0 {
            QcCheck::new(
                "value_bounds",
                CheckStatus::Ok,
                "all exposure values within physical bounds".to_string(),
            )
        } else if out_of_bounds.is_empty() {
            QcCheck::new(
                "value_bounds",
                CheckStatus::Warning,
                format!("{withheld} exposures withheld for out-of-bounds daily means"),
            )
        } else {
            let detail: Vec<String> = out_of_bounds
                .iter()
                .map(|(p, n)| format!("{p}: {n}"))
                .collect();
            QcCheck::new(
                "value_bounds",
                CheckStatus::Error,
                format!("exposure values out of bounds ({})", detail.join(", ")),
            )
        }
    }

    fn check_distance_outliers(&self, distance: &DistanceStats) -> QcCheck {
        let limit = self.criteria.outlier_distance_m;
        if distance.beyond_outlier == 0 {
            QcCheck::new(
                "distance_outliers",
                CheckStatus::Ok,
                format!("no match farther than {limit} m"),
            )
        } else {
            QcCheck::new(
                "distance_outliers",
                CheckStatus::Warning,
                format!("{} matches farther than {limit} m", distance.beyond_outlier),
            )
        }
    }
}

/// Median, p95, and maximum over the finite distances
pub fn distance_stats(matches: &[SchoolStationMatch], outlier_distance_m: f64) -> DistanceStats {
    let mut distances: Vec<f64> = matches
        .iter()
        .map(|m| m.distance_m)
        .filter(|d| d.is_finite())
        .collect();
    distances.sort_by(|a, b| a.total_cmp(b));

    DistanceStats {
        count: distances.len(),
        median_m: percentile(&distances, 0.5),
        p95_m: percentile(&distances, 0.95),
        max_m: distances.last().copied(),
        beyond_outlier: distances.iter().filter(|&&d| d > outlier_distance_m).count(),
    }
}

/// Percentile of sorted values, linearly interpolated between order statistics
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Completeness over schools × pollutants-with-data × days-in-range
pub fn completeness(
    schools: usize,
    daily: &[StationDaily],
    exposures: &[SchoolExposureDaily],
) -> Completeness {
    let pollutants: BTreeSet<Pollutant> = daily.iter().map(|d| d.pollutant).collect();
    let first_day = daily.iter().map(|d| d.date).min();
    let last_day = daily.iter().map(|d| d.date).max();

    let days = match (first_day, last_day) {
        (Some(first), Some(last)) => (last - first).num_days() as usize + 1,
        _ => 0,
    };

    let expected = schools * pollutants.len() * days;
    let emitted = exposures.len();
    let ratio = if expected > 0 {
        emitted as f64 / expected as f64
    } else {
        0.0
    };

    Completeness {
        schools,
        pollutants: pollutants.into_iter().collect(),
        first_day,
        last_day,
        days,
        expected,
        emitted,
        ratio,
    }
}

fn list_ids(ids: &[&str]) -> String {
    let mut listed = ids
        .iter()
        .take(MAX_LISTED_IDS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > MAX_LISTED_IDS {
        listed.push_str(", ...");
    }
    listed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoPoint, School};
    use pretty_assertions::assert_eq;

    fn schools(ids: &[&str]) -> SchoolRegistry {
        SchoolRegistry::new(ids.iter().map(|id| School {
            id: id.to_string(),
            name: None,
            location: GeoPoint::new(2.17, 41.39),
        }))
    }

    fn matched(school: &str, distance_m: f64) -> SchoolStationMatch {
        SchoolStationMatch {
            school_id: school.to_string(),
            station_id: "4".to_string(),
            distance_m,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn daily(pollutant: Pollutant, d: u32, valid_hours: u32) -> StationDaily {
        StationDaily {
            station_id: "4".to_string(),
            pollutant,
            date: date(d),
            mean: 20.0,
            valid_hours,
        }
    }

    fn exposure(school: &str, pollutant: Pollutant, d: u32, value: f64) -> SchoolExposureDaily {
        SchoolExposureDaily {
            school_id: school.to_string(),
            station_id: "4".to_string(),
            pollutant,
            date: date(d),
            value,
            valid_hours: 24,
            coverage: 1.0,
        }
    }

    fn engine() -> QcEngine {
        QcEngine::new(AcceptanceCriteria::default(), CoveragePolicy::default())
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.5), Some(2.5));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert!((percentile(&values, 0.95).unwrap() - 3.85).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_distance_stats() {
        let matches: Vec<SchoolStationMatch> = (1..=100)
            .map(|i| matched(&format!("s{i}"), i as f64 * 100.0))
            .collect();
        let stats = distance_stats(&matches, 6_250.0);

        assert_eq!(stats.count, 100);
        assert_eq!(stats.median_m, Some(5_050.0));
        assert!((stats.p95_m.unwrap() - 9_505.0).abs() < 1e-9);
        assert_eq!(stats.max_m, Some(10_000.0));
        assert_eq!(stats.beyond_outlier, 38);
    }

    #[test]
    fn test_completeness_ratio() {
        let daily = vec![
            daily(Pollutant::No2, 10, 24),
            daily(Pollutant::No2, 12, 24),
            daily(Pollutant::Pm10, 11, 24),
        ];
        let exposures = vec![
            exposure("a", Pollutant::No2, 10, 20.0),
            exposure("b", Pollutant::No2, 10, 20.0),
            exposure("a", Pollutant::Pm10, 11, 20.0),
        ];
        let c = completeness(2, &daily, &exposures);

        assert_eq!(c.pollutants, vec![Pollutant::Pm10, Pollutant::No2]);
        assert_eq!(c.days, 3);
        assert_eq!(c.expected, 12);
        assert_eq!(c.emitted, 3);
        assert!((c.ratio - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_pass_on_clean_input() {
        let registry = schools(&["a", "b"]);
        let matches = vec![matched("a", 900.0), matched("b", 1_800.0)];
        let daily = vec![daily(Pollutant::No2, 10, 24)];
        let exposures = vec![
            exposure("a", Pollutant::No2, 10, 20.0),
            exposure("b", Pollutant::No2, 10, 20.0),
        ];
        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &daily,
            exposures: &exposures,
            withheld_out_of_bounds: 0,
        });

        assert!(report.accepted());
        assert!(report.failed_checks.is_empty());
        assert_eq!(report.checks.len(), 7);
        assert_eq!(report.completeness.ratio, 1.0);
    }

    #[test]
    fn test_failures_are_itemized() {
        let registry = schools(&["a", "b", "c"]);
        let matches = vec![
            matched("a", 900.0),
            matched("a", 950.0),
            matched("b", -1.0),
            matched("zz", 100.0),
        ];
        let daily = vec![daily(Pollutant::No2, 10, 25)];
        let exposures = vec![exposure("a", Pollutant::No2, 10, 900.0)];
        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &daily,
            exposures: &exposures,
            withheld_out_of_bounds: 0,
        });

        assert!(!report.accepted());
        assert_eq!(
            report.failed_checks,
            vec![
                "match_cardinality".to_string(),
                "match_distance".to_string(),
                "completeness".to_string(),
                "daily_sample_counts".to_string(),
                "value_bounds".to_string(),
            ]
        );

        let cardinality = report.check("match_cardinality").unwrap();
        assert!(cardinality.message.contains("1 without match [c]"));
        assert!(cardinality.message.contains("1 with multiple matches [a]"));
        assert!(cardinality.message.contains("unknown schools [zz]"));
    }

    #[test]
    fn test_completeness_threshold_is_strict() {
        let registry = schools(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
        let matches: Vec<SchoolStationMatch> =
            registry.ids().map(|id| matched(id, 1_000.0)).collect();
        let daily = vec![daily(Pollutant::No2, 10, 24)];
        let exposures: Vec<SchoolExposureDaily> = registry
            .ids()
            .take(7)
            .map(|id| exposure(id, Pollutant::No2, 10, 20.0))
            .collect();

        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &daily,
            exposures: &exposures,
            withheld_out_of_bounds: 0,
        });

        // 7/10 equals the 0.70 minimum, which does not exceed it
        assert!(!report.accepted());
        assert_eq!(report.failed_checks, vec!["completeness".to_string()]);
    }

    #[test]
    fn test_outliers_warn_without_failing() {
        let registry = schools(&["a"]);
        let matches = vec![matched("a", 7_000.0)];
        let daily = vec![daily(Pollutant::No2, 10, 24)];
        let exposures = vec![exposure("a", Pollutant::No2, 10, 20.0)];
        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &daily,
            exposures: &exposures,
            withheld_out_of_bounds: 0,
        });

        assert!(report.accepted());
        assert_eq!(
            report.check("distance_outliers").unwrap().status,
            CheckStatus::Warning
        );
    }

    #[test]
    fn test_no_data_fails_completeness() {
        let registry = schools(&["a"]);
        let matches = vec![matched("a", 500.0)];
        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &[],
            exposures: &[],
            withheld_out_of_bounds: 0,
        });

        assert!(!report.accepted());
        assert_eq!(report.completeness.expected, 0);
        assert_eq!(report.failed_checks, vec!["completeness".to_string()]);
    }

    #[test]
    fn test_withheld_values_warn_without_failing() {
        let registry = schools(&["a"]);
        let matches = vec![matched("a", 800.0)];
        let daily = vec![daily(Pollutant::Pm10, 10, 24), daily(Pollutant::Pm10, 11, 24)];
        let exposures = vec![exposure("a", Pollutant::Pm10, 10, 30.0)];
        let report = engine().evaluate(&QcInput {
            schools: &registry,
            matches: &matches,
            daily: &daily,
            exposures: &exposures,
            withheld_out_of_bounds: 1,
        });

        assert!(report.accepted());
        let bounds = report.check("value_bounds").unwrap();
        assert_eq!(bounds.status, CheckStatus::Warning);
        assert!(bounds.message.starts_with("1 exposures withheld"));
    }
}
