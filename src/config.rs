//! Pipeline configuration
//!
//! Policy values (coverage gate, acceptance thresholds), the pollutant code
//! table, and the reference frames live here as one immutable value that is
//! handed to every stage.

use crate::error::ComputeError;
use crate::types::Pollutant;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum fraction of hourly slots that must hold a valid sample
pub const DEFAULT_MIN_COVERAGE: f64 = 0.75;

/// Hourly slots in a calendar day
pub const DEFAULT_SLOTS_PER_DAY: u32 = 24;

/// Minimum share of expected school/pollutant/day cells that must be emitted
pub const DEFAULT_MIN_COMPLETENESS: f64 = 0.70;

/// Match distance above which QC raises an outlier warning (meters)
pub const DEFAULT_OUTLIER_DISTANCE_M: f64 = 6_250.0;

/// IANA zone used for day boundaries
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

/// UTM zone of the metric frame (ETRS89 / UTM 31N, EPSG:25831)
pub const DEFAULT_UTM_ZONE: u8 = 31;

/// The only source code allowed to feed ozone
pub const DEFAULT_OZONE_CODE: &str = "9";

/// Coverage gate applied to station-days before they become exposures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoveragePolicy {
    pub min_fraction: f64,
    pub slots_per_day: u32,
}

impl Default for CoveragePolicy {
    fn default() -> Self {
        Self {
            min_fraction: DEFAULT_MIN_COVERAGE,
            slots_per_day: DEFAULT_SLOTS_PER_DAY,
        }
    }
}

impl CoveragePolicy {
    /// Fraction of the day's slots covered by `valid_hours` samples
    pub fn fraction(&self, valid_hours: u32) -> f64 {
        f64::from(valid_hours) / f64::from(self.slots_per_day)
    }

    /// Whether a station-day with `valid_hours` samples passes the gate
    pub fn admits(&self, valid_hours: u32) -> bool {
        self.fraction(valid_hours) >= self.min_fraction
    }
}

/// Pipeline-wide acceptance criteria for the QC stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceCriteria {
    /// Completeness ratio must strictly exceed this value
    pub min_completeness: f64,
    pub outlier_distance_m: f64,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self {
            min_completeness: DEFAULT_MIN_COMPLETENESS,
            outlier_distance_m: DEFAULT_OUTLIER_DISTANCE_M,
        }
    }
}

/// Code table, whitelist, and ozone channel rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollutantCatalog {
    /// Normalized source code -> canonical pollutant
    pub codes: BTreeMap<String, Pollutant>,
    pub whitelist: BTreeSet<Pollutant>,
    pub ozone_code: String,
}

impl Default for PollutantCatalog {
    fn default() -> Self {
        let codes = [
            ("1", Pollutant::So2),
            ("6", Pollutant::Co),
            ("7", Pollutant::No),
            ("8", Pollutant::No2),
            ("9", Pollutant::O3),
            ("10", Pollutant::Pm10),
            ("38", Pollutant::Pm25),
            ("39", Pollutant::Pm1),
            ("12", Pollutant::Benzene),
            ("14", Pollutant::Toluene),
            ("20", Pollutant::Xylene),
        ]
        .into_iter()
        .map(|(code, pollutant)| (code.to_string(), pollutant))
        .collect();

        Self {
            codes,
            whitelist: Pollutant::ALL.into_iter().collect(),
            ozone_code: DEFAULT_OZONE_CODE.to_string(),
        }
    }
}

impl PollutantCatalog {
    /// Map a normalized code to its pollutant
    pub fn lookup(&self, code: &str) -> Option<Pollutant> {
        self.codes.get(code).copied()
    }

    pub fn is_whitelisted(&self, pollutant: Pollutant) -> bool {
        self.whitelist.contains(&pollutant)
    }
}

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timezone: String,
    pub utm_zone: u8,
    pub pollutants: PollutantCatalog,
    pub coverage: CoveragePolicy,
    pub acceptance: AcceptanceCriteria,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            utm_zone: DEFAULT_UTM_ZONE,
            pollutants: PollutantCatalog::default(),
            coverage: CoveragePolicy::default(),
            acceptance: AcceptanceCriteria::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from JSON; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    /// Resolve the configured IANA zone
    pub fn tz(&self) -> Result<Tz, ComputeError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ComputeError::InvalidTimezone(format!("{}: {}", self.timezone, e)))
    }

    /// Check every policy value for consistency
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.tz()?;

        if !(1..=60).contains(&self.utm_zone) {
            return Err(ComputeError::InvalidConfig(format!(
                "utm_zone must be within 1..=60, got {}",
                self.utm_zone
            )));
        }

        let coverage = &self.coverage;
        if coverage.slots_per_day == 0 {
            return Err(ComputeError::InvalidConfig(
                "coverage.slots_per_day must be positive".to_string(),
            ));
        }
        if !(coverage.min_fraction > 0.0 && coverage.min_fraction <= 1.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "coverage.min_fraction must be within (0, 1], got {}",
                coverage.min_fraction
            )));
        }

        let acceptance = &self.acceptance;
        if !(0.0..=1.0).contains(&acceptance.min_completeness) {
            return Err(ComputeError::InvalidConfig(format!(
                "acceptance.min_completeness must be within [0, 1], got {}",
                acceptance.min_completeness
            )));
        }
        if !(acceptance.outlier_distance_m.is_finite() && acceptance.outlier_distance_m > 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "acceptance.outlier_distance_m must be positive, got {}",
                acceptance.outlier_distance_m
            )));
        }

        let pollutants = &self.pollutants;
        if pollutants.ozone_code.trim().is_empty() {
            return Err(ComputeError::InvalidConfig(
                "pollutants.ozone_code must not be empty".to_string(),
            ));
        }
        if pollutants.is_whitelisted(Pollutant::O3)
            && pollutants.lookup(&pollutants.ozone_code) != Some(Pollutant::O3)
        {
            return Err(ComputeError::InvalidConfig(format!(
                "pollutants.ozone_code {} does not map to o3",
                pollutants.ozone_code
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Madrid);
    }

    #[test]
    fn test_coverage_boundary() {
        let policy = CoveragePolicy::default();
        assert!(policy.admits(18));
        assert!(!policy.admits(17));
        assert!(policy.admits(24));
        assert!((policy.fraction(18) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"coverage": {"min_fraction": 0.5}}"#).unwrap();
        assert_eq!(config.coverage.min_fraction, 0.5);
        assert_eq!(config.coverage.slots_per_day, DEFAULT_SLOTS_PER_DAY);
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.pollutants.lookup("8"), Some(Pollutant::No2));
    }

    #[test]
    fn test_invalid_timezone() {
        let result = PipelineConfig::from_json(r#"{"timezone": "Mars/Olympus_Mons"}"#);
        assert!(matches!(result, Err(ComputeError::InvalidTimezone(_))));
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut config = PipelineConfig::default();
        config.coverage.min_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ComputeError::InvalidConfig(_))));

        let mut config = PipelineConfig::default();
        config.acceptance.min_completeness = -0.1;
        assert!(matches!(config.validate(), Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_ozone_code_must_map_to_ozone() {
        let mut config = PipelineConfig::default();
        config.pollutants.ozone_code = "8".to_string();
        assert!(matches!(config.validate(), Err(ComputeError::InvalidConfig(_))));

        // Irrelevant once ozone is off the whitelist
        config.pollutants.whitelist.remove(&Pollutant::O3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = PipelineConfig::default();
        let json = config.to_json().unwrap();
        let loaded = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(config, loaded);
    }
}
