//! Weekly summaries
//!
//! Rolls daily exposures up into ISO weeks. The coverage gate is not applied
//! again; a week's mean is taken over whichever daily exposures exist.

use crate::error::ComputeError;
use crate::types::{Pollutant, SchoolExposureDaily, WeeklySummary};
use chrono::Datelike;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Format an ISO year and week as "YYYY-Www"
pub fn year_week_label(iso_year: i32, iso_week: u32) -> String {
    format!("{iso_year}-W{iso_week:02}")
}

/// Groups daily exposures by (school, pollutant, ISO week)
pub struct WeeklySummarizer;

impl WeeklySummarizer {
    /// Summaries ordered by (school, pollutant, year, week)
    pub fn summarize(exposures: &[SchoolExposureDaily]) -> Vec<WeeklySummary> {
        let mut groups: BTreeMap<(&str, Pollutant, i32, u32), (f64, u32)> = BTreeMap::new();
        for exposure in exposures {
            let week = exposure.date.iso_week();
            let entry = groups
                .entry((
                    exposure.school_id.as_str(),
                    exposure.pollutant,
                    week.year(),
                    week.week(),
                ))
                .or_insert((0.0, 0));
            entry.0 += exposure.value;
            entry.1 += 1;
        }

        let summaries: Vec<WeeklySummary> = groups
            .into_iter()
            .map(|((school_id, pollutant, iso_year, iso_week), (sum, n))| WeeklySummary {
                school_id: school_id.to_string(),
                pollutant,
                iso_year,
                iso_week,
                year_week: year_week_label(iso_year, iso_week),
                mean: sum / f64::from(n),
                sample_count: n,
            })
            .collect();

        debug!(
            "summarized {} daily exposures into {} school-weeks",
            exposures.len(),
            summaries.len()
        );
        summaries
    }
}

/// Which ISO week to pull out of a set of summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WeekSelector {
    /// Most recent week holding data for the pollutant
    #[default]
    Latest,
    Iso { year: i32, week: u32 },
}

impl fmt::Display for WeekSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekSelector::Latest => f.write_str("latest"),
            WeekSelector::Iso { year, week } => f.write_str(&year_week_label(*year, *week)),
        }
    }
}

impl FromStr for WeekSelector {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(WeekSelector::Latest);
        }

        let invalid = || ComputeError::InvalidWeekSelector(format!("{s:?} (expected latest or YYYY-Www)"));
        let (year, week) = s.split_once("-W").ok_or_else(invalid)?;
        if year.len() != 4 || week.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        if !(1..=53).contains(&week) {
            return Err(invalid());
        }
        Ok(WeekSelector::Iso { year, week })
    }
}

/// Summaries of one pollutant for the selected week, ordered by school
pub fn select_week(
    summaries: &[WeeklySummary],
    pollutant: Pollutant,
    selector: WeekSelector,
) -> Result<Vec<WeeklySummary>, ComputeError> {
    let available: BTreeSet<(i32, u32)> = summaries
        .iter()
        .filter(|s| s.pollutant == pollutant)
        .map(|s| (s.iso_year, s.iso_week))
        .collect();

    let target = match selector {
        WeekSelector::Latest => available.iter().next_back().copied(),
        WeekSelector::Iso { year, week } => Some((year, week)).filter(|w| available.contains(w)),
    };

    let Some((year, week)) = target else {
        let listed: Vec<String> = available
            .iter()
            .map(|(y, w)| year_week_label(*y, *w))
            .collect();
        return Err(ComputeError::NoWeeklyData(format!(
            "{pollutant} has no data for {selector}; available weeks: [{}]",
            listed.join(", ")
        )));
    };

    let mut selected: Vec<WeeklySummary> = summaries
        .iter()
        .filter(|s| s.pollutant == pollutant && s.iso_year == year && s.iso_week == week)
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.school_id.cmp(&b.school_id));
    Ok(selected)
}
