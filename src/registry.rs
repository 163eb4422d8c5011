//! Station and school registries
//!
//! Registries are the read-only reference data shared by every stage. Loading
//! one trims identifiers, drops records with unusable coordinates, and keeps
//! the first record for each identifier.

use crate::types::{GeoPoint, School, Station};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record with an identifier and a geographic position
pub trait Located {
    fn id(&self) -> &str;
    fn location(&self) -> GeoPoint;
    fn set_id(&mut self, id: String);
}

impl Located for Station {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> GeoPoint {
        self.location
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Located for School {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> GeoPoint {
        self.location
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Outcome of loading a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReport {
    pub input: usize,
    pub kept: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Immutable set of located records keyed by identifier
#[derive(Debug, Clone)]
pub struct Registry<T> {
    records: BTreeMap<String, T>,
    report: RegistryReport,
}

pub type StationRegistry = Registry<Station>;
pub type SchoolRegistry = Registry<School>;

impl<T: Located> Registry<T> {
    /// Build a registry, keeping the first record for each identifier
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        let mut report = RegistryReport::default();
        let mut by_id: BTreeMap<String, T> = BTreeMap::new();

        for mut record in records {
            report.input += 1;

            let id = record.id().trim().to_string();
            if id.is_empty() || !record.location().is_valid() {
                warn!(
                    "rejecting record {:?}: empty id or invalid coordinates {:?}",
                    record.id(),
                    record.location()
                );
                report.invalid += 1;
                continue;
            }

            if by_id.contains_key(&id) {
                report.duplicates += 1;
                continue;
            }

            record.set_id(id.clone());
            by_id.insert(id, record);
        }

        report.kept = by_id.len();
        info!(
            "registry loaded: {} input, {} kept, {} duplicates, {} invalid",
            report.input, report.kept, report.duplicates, report.invalid
        );

        Self {
            records: by_id,
            report,
        }
    }

    /// Records in ascending identifier order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn report(&self) -> &RegistryReport {
        &self.report
    }
}
