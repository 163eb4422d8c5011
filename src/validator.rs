//! Pollutant validation
//!
//! This module turns the raw hourly stream into validated readings:
//! - Source codes normalized and mapped to canonical pollutants
//! - Whitelist and ozone-channel rules applied
//! - Malformed records dropped with a counted reason
//!
//! Records flagged invalid by the instrument are kept here; they are excluded
//! from averaging by the aggregator.

use crate::clock::LocalClock;
use crate::config::PollutantCatalog;
use crate::types::{Pollutant, RawReading, Reading};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a raw record did not make it into the validated stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Missing station, bad timestamp, or missing/negative/non-finite value
    MalformedRecord,
    /// Code absent from the code table
    UnmappedCode,
    /// Pollutant not on the whitelist
    NotWhitelisted,
    /// Ozone reported through a channel other than the official code
    UnofficialOzoneCode,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MalformedRecord => "malformed_record",
            DropReason::UnmappedCode => "unmapped_code",
            DropReason::NotWhitelisted => "not_whitelisted",
            DropReason::UnofficialOzoneCode => "unofficial_ozone_code",
        };
        f.write_str(s)
    }
}

/// Bookkeeping for one validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub input: usize,
    pub kept: usize,
    /// Kept records whose validity flag is false
    pub invalid_retained: usize,
    pub dropped: BTreeMap<DropReason, usize>,
    /// Kept record count per pollutant
    pub per_pollutant: BTreeMap<Pollutant, usize>,
}

impl ValidationSummary {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }
}

/// Validated stream plus its summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedReadings {
    pub readings: Vec<Reading>,
    pub summary: ValidationSummary,
}

/// Validator applying the code table, whitelist, and ozone rule
#[derive(Debug, Clone)]
pub struct PollutantValidator {
    catalog: PollutantCatalog,
    clock: LocalClock,
}

impl PollutantValidator {
    pub fn new(catalog: PollutantCatalog, clock: LocalClock) -> Self {
        Self { catalog, clock }
    }

    /// Validate a batch of raw records, preserving input order
    pub fn validate(&self, raw: &[RawReading]) -> ValidatedReadings {
        let mut summary = ValidationSummary {
            input: raw.len(),
            ..Default::default()
        };
        let mut readings = Vec::with_capacity(raw.len());

        for (idx, record) in raw.iter().enumerate() {
            match self.check(record) {
                Ok(reading) => {
                    if !reading.valid {
                        summary.invalid_retained += 1;
                    }
                    *summary.per_pollutant.entry(reading.pollutant).or_insert(0) += 1;
                    readings.push(reading);
                }
                Err(reason) => {
                    debug!(
                        "dropping record {} (station {}, code {:?}): {}",
                        idx, record.station_id, record.pollutant_code, reason
                    );
                    *summary.dropped.entry(reason).or_insert(0) += 1;
                }
            }
        }

        summary.kept = readings.len();
        info!(
            "validated {} records: kept {}, dropped {}, invalid retained {}",
            summary.input,
            summary.kept,
            summary.dropped_total(),
            summary.invalid_retained
        );

        ValidatedReadings { readings, summary }
    }

    /// Validate a single record
    pub fn check(&self, record: &RawReading) -> Result<Reading, DropReason> {
        let station_id = record.station_id.trim();
        if station_id.is_empty() {
            return Err(DropReason::MalformedRecord);
        }

        let value = match record.value {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            _ => return Err(DropReason::MalformedRecord),
        };

        let stamp = self
            .clock
            .parse_stamp(&record.timestamp)
            .ok_or(DropReason::MalformedRecord)?;

        let code = normalize_code(&record.pollutant_code);
        let pollutant = self
            .catalog
            .lookup(&code)
            .ok_or(DropReason::UnmappedCode)?;

        if !self.catalog.is_whitelisted(pollutant) {
            return Err(DropReason::NotWhitelisted);
        }

        // Auxiliary ozone channels would double-count ozone
        if pollutant == Pollutant::O3 && code != self.catalog.ozone_code {
            return Err(DropReason::UnofficialOzoneCode);
        }

        Ok(Reading {
            station_id: station_id.to_string(),
            pollutant_code: code,
            pollutant,
            timestamp: stamp.instant,
            source_hour: stamp.wall_hour,
            value,
            valid: record.valid,
        })
    }
}

/// Trim a source code and strip a trailing ".0" left by float-typed exports
pub fn normalize_code(code: &str) -> String {
    let trimmed = code.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}
