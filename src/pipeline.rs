//! Pipeline orchestration
//!
//! This module provides the public API for the exposure engine.
//! It chains the stages from raw hourly readings to accepted school exposures.

use crate::aggregator::{AggregationSummary, DailyAggregator};
use crate::clock::LocalClock;
use crate::config::PipelineConfig;
use crate::crs::UtmProjection;
use crate::error::ComputeError;
use crate::exposure::{ExposureCalculator, ExposureSummary};
use crate::matcher::NearestStationMatcher;
use crate::qc::{QcEngine, QcInput, QcReport};
use crate::registry::{RegistryReport, SchoolRegistry, StationRegistry};
use crate::types::{
    RawReading, School, SchoolExposureDaily, SchoolStationMatch, Station, StationDaily,
    WeeklySummary,
};
use crate::validator::{PollutantValidator, ValidationSummary};
use crate::weekly::WeeklySummarizer;
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use log::info;
use serde::{Deserialize, Serialize};

/// Name and version of the engine that produced an output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

impl Default for Producer {
    fn default() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
        }
    }
}

/// Per-stage bookkeeping for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stations: RegistryReport,
    pub schools: RegistryReport,
    pub validation: ValidationSummary,
    pub aggregation: AggregationSummary,
    pub exposure: ExposureSummary,
}

/// Everything one run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub producer: Producer,
    pub summary: RunSummary,
    pub station_daily: Vec<StationDaily>,
    pub matches: Vec<SchoolStationMatch>,
    pub exposures: Vec<SchoolExposureDaily>,
    pub weekly: Vec<WeeklySummary>,
    pub qc: QcReport,
}

impl PipelineOutput {
    /// Whether QC accepted the run
    pub fn accepted(&self) -> bool {
        self.qc.accepted()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ComputeError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Configured pipeline.
///
/// Pipeline stages:
/// 1. PollutantValidator - Map codes, apply the whitelist and ozone rule
/// 2. DailyAggregator - Local-day means per station and pollutant
/// 3. NearestStationMatcher - Nearest station per school in the metric frame
/// 4. ExposureCalculator - Coverage-gated join of matches and station-days,
///    withholding physically implausible means
/// 5. QcEngine - Distance stats, completeness, acceptance checks
/// 6. WeeklySummarizer - ISO-week means
#[derive(Debug, Clone)]
pub struct ExposurePipeline {
    config: PipelineConfig,
    validator: PollutantValidator,
    aggregator: DailyAggregator,
    matcher: NearestStationMatcher,
    calculator: ExposureCalculator,
    qc: QcEngine,
}

impl ExposurePipeline {
    /// Build every stage from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self, ComputeError> {
        config.validate()?;

        let clock = LocalClock::new(config.tz()?);
        let projection = UtmProjection::new(config.utm_zone)?;

        Ok(Self {
            validator: PollutantValidator::new(config.pollutants.clone(), clock),
            aggregator: DailyAggregator::new(clock),
            matcher: NearestStationMatcher::new(projection),
            calculator: ExposureCalculator::new(config.coverage),
            qc: QcEngine::new(config.acceptance, config.coverage),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn validator(&self) -> &PollutantValidator {
        &self.validator
    }

    /// Run all stages over one batch
    pub fn run(
        &self,
        stations: &StationRegistry,
        schools: &SchoolRegistry,
        raw: &[RawReading],
    ) -> PipelineOutput {
        info!(
            "running pipeline: {} stations, {} schools, {} raw readings",
            stations.len(),
            schools.len(),
            raw.len()
        );

        // Stage 1: Validate pollutant codes
        let validated = self.validator.validate(raw);

        // Stage 2: Aggregate to local station-days
        let daily = self.aggregator.aggregate(&validated.readings);

        // Stage 3: Match schools to stations
        let matches = self.matcher.match_schools(schools, stations);

        // Stage 4: Apply the coverage gate
        let exposure = self.calculator.compute(&matches, &daily.records);

        // Stage 5: Acceptance
        let qc = self.qc.evaluate(&QcInput {
            schools,
            matches: &matches,
            daily: &daily.records,
            exposures: &exposure.records,
            withheld_out_of_bounds: exposure.summary.out_of_bounds,
        });

        // Stage 6: Weekly rollup
        let weekly = WeeklySummarizer::summarize(&exposure.records);

        PipelineOutput {
            producer: Producer::default(),
            summary: RunSummary {
                stations: stations.report().clone(),
                schools: schools.report().clone(),
                validation: validated.summary,
                aggregation: daily.summary,
                exposure: exposure.summary,
            },
            station_daily: daily.records,
            matches,
            exposures: exposure.records,
            weekly,
            qc,
        }
    }
}

/// Build the registries and run the pipeline in one call.
///
/// # Example
/// ```ignore
/// let output = run_pipeline(PipelineConfig::default(), stations, schools, &readings)?;
/// assert!(output.accepted());
/// ```
pub fn run_pipeline(
    config: PipelineConfig,
    stations: Vec<Station>,
    schools: Vec<School>,
    raw: &[RawReading],
) -> Result<PipelineOutput, ComputeError> {
    let pipeline = ExposurePipeline::new(config)?;
    let stations = StationRegistry::new(stations);
    let schools = SchoolRegistry::new(schools);
    Ok(pipeline.run(&stations, &schools, raw))
}
