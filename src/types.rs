//! Core types for the exposure pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: registries, raw and validated readings, station daily aggregates,
//! school matches, daily exposures, and weekly summaries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Canonical pollutant names admitted into aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm10,
    Pm25,
    Pm1,
    No,
    No2,
    O3,
    So2,
    Co,
    Benzene,
    Toluene,
    Xylene,
}

impl Pollutant {
    pub const ALL: [Pollutant; 11] = [
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::Pm1,
        Pollutant::No,
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::So2,
        Pollutant::Co,
        Pollutant::Benzene,
        Pollutant::Toluene,
        Pollutant::Xylene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm1 => "pm1",
            Pollutant::No => "no",
            Pollutant::No2 => "no2",
            Pollutant::O3 => "o3",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
            Pollutant::Benzene => "benzene",
            Pollutant::Toluene => "toluene",
            Pollutant::Xylene => "xylene",
        }
    }

    /// Look up a pollutant by name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        let needle = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == needle)
    }

    /// Physically plausible range for a daily mean (inclusive)
    pub fn physical_bounds(&self) -> (f64, f64) {
        match self {
            Pollutant::Pm25 => (0.0, 250.0),
            Pollutant::Pm10 => (0.0, 400.0),
            Pollutant::Pm1 => (0.0, 200.0),
            Pollutant::No2 => (0.0, 400.0),
            Pollutant::No => (0.0, 500.0),
            Pollutant::O3 => (0.0, 300.0),
            Pollutant::So2 => (0.0, 500.0),
            // CO is reported in heterogeneous units
            Pollutant::Co => (0.0, 1_000_000.0),
            Pollutant::Benzene => (0.0, 200.0),
            Pollutant::Toluene => (0.0, 1_000.0),
            Pollutant::Xylene => (0.0, 1_000.0),
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point in the geographic frame (degrees, EPSG:4326)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Whether the coordinates are finite and inside the valid lon/lat ranges
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// Point in the metric frame (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub easting: f64,
    pub northing: f64,
}

impl MetricPoint {
    pub fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    /// Euclidean distance in meters
    pub fn distance_to(&self, other: &MetricPoint) -> f64 {
        (self.easting - other.easting).hypot(self.northing - other.northing)
    }
}

/// Air-quality monitoring station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    /// Pollutant codes the station reports
    #[serde(default)]
    pub pollutant_codes: BTreeSet<String>,
}

/// School receiving an exposure estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub location: GeoPoint,
}

/// Hourly reading as delivered by ingestion, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub station_id: String,
    /// Source pollutant code (e.g. "8", "8.0")
    pub pollutant_code: String,
    /// RFC 3339 instant, or a naive local time ("2024-05-01T23:00:00")
    pub timestamp: String,
    pub value: Option<f64>,
    /// Instrument-asserted reliability
    pub valid: bool,
}

/// Validated hourly reading with its canonical pollutant attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    /// Normalized source code
    pub pollutant_code: String,
    pub pollutant: Pollutant,
    pub timestamp: DateTime<Utc>,
    /// Local wall-clock hour the source stamped the reading with
    pub source_hour: u32,
    pub value: f64,
    pub valid: bool,
}

/// Nearest station assigned to a school
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolStationMatch {
    pub school_id: String,
    pub station_id: String,
    /// Distance in the metric frame (meters)
    pub distance_m: f64,
}

/// One station's daily mean for one pollutant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDaily {
    pub station_id: String,
    pub pollutant: Pollutant,
    /// Local calendar day
    pub date: NaiveDate,
    pub mean: f64,
    /// Number of valid hourly samples (1-24)
    pub valid_hours: u32,
}

/// Daily exposure of a school to one pollutant
///
/// Only emitted when the supporting station-day met the coverage gate. A
/// missing (school, pollutant, date) triple means insufficient data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolExposureDaily {
    pub school_id: String,
    pub station_id: String,
    pub pollutant: Pollutant,
    pub date: NaiveDate,
    pub value: f64,
    pub valid_hours: u32,
    /// valid_hours / slots per day
    pub coverage: f64,
}

/// Mean of the daily exposures within one ISO week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub school_id: String,
    pub pollutant: Pollutant,
    pub iso_year: i32,
    pub iso_week: u32,
    /// "YYYY-Www"
    pub year_week: String,
    pub mean: f64,
    /// Number of daily values behind the mean
    pub sample_count: u32,
}
