//! Nearest-station matching
//!
//! Every school is assigned the station closest to it in the metric frame.
//! There is no distance cutoff; far matches are kept and left for QC to flag.

use crate::crs::UtmProjection;
use crate::registry::{SchoolRegistry, StationRegistry};
use crate::types::{MetricPoint, SchoolStationMatch};
use log::{info, warn};

/// Matcher assigning each school its nearest station
#[derive(Debug, Clone)]
pub struct NearestStationMatcher {
    projection: UtmProjection,
}

impl NearestStationMatcher {
    pub fn new(projection: UtmProjection) -> Self {
        Self { projection }
    }

    /// Match every school to its nearest station.
    ///
    /// Output is ordered by school id. Equal distances resolve to the lowest
    /// station id. Records whose coordinates cannot be projected are skipped
    /// and surface in QC as missing matches.
    pub fn match_schools(
        &self,
        schools: &SchoolRegistry,
        stations: &StationRegistry,
    ) -> Vec<SchoolStationMatch> {
        let station_points = self.project_stations(stations);
        if station_points.is_empty() {
            warn!("no projectable stations; {} schools left unmatched", schools.len());
            return Vec::new();
        }

        let mut matches = Vec::with_capacity(schools.len());
        for school in schools.iter() {
            let school_point = match self.projection.to_metric(&school.location) {
                Ok(p) => p,
                Err(e) => {
                    warn!("school {} skipped: {}", school.id, e);
                    continue;
                }
            };

            if let Some((station_id, distance_m)) = nearest(&school_point, &station_points) {
                matches.push(SchoolStationMatch {
                    school_id: school.id.clone(),
                    station_id: station_id.to_string(),
                    distance_m,
                });
            }
        }

        info!(
            "matched {} of {} schools against {} stations",
            matches.len(),
            schools.len(),
            station_points.len()
        );
        matches
    }

    /// Station positions in the metric frame, in ascending id order
    fn project_stations<'a>(&self, stations: &'a StationRegistry) -> Vec<(&'a str, MetricPoint)> {
        stations
            .iter()
            .filter_map(|station| match self.projection.to_metric(&station.location) {
                Ok(p) => Some((station.id.as_str(), p)),
                Err(e) => {
                    warn!("station {} skipped: {}", station.id, e);
                    None
                }
            })
            .collect()
    }
}

/// Closest candidate by Euclidean distance.
///
/// `candidates` must be sorted by id; a strict comparison then keeps the
/// lowest id among equal distances. Ids compare as strings, so station "10"
/// wins a tie against station "4".
fn nearest<'a>(point: &MetricPoint, candidates: &[(&'a str, MetricPoint)]) -> Option<(&'a str, f64)> {
    let mut best: Option<(&'a str, f64)> = None;
    for (id, candidate) in candidates {
        let d = point.distance_to(candidate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((*id, d)),
        }
    }
    best
}
