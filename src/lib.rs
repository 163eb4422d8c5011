//! School Exposure - batch engine for daily school air-pollution exposure
//!
//! Hourly station readings become coverage-gated daily exposures for every
//! school through a deterministic pipeline: pollutant validation → local-day
//! aggregation → nearest-station matching → coverage gate → QC acceptance
//! → weekly summaries.
//!
//! ## Modules
//!
//! - **Reference data**: station and school registries, metric projection
//! - **Stages**: validator, aggregator, matcher, exposure, qc, weekly
//! - **Pipeline**: configured orchestration of all stages

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod crs;
pub mod error;
pub mod exposure;
pub mod matcher;
pub mod pipeline;
pub mod qc;
pub mod registry;
pub mod types;
pub mod validator;
pub mod weekly;

pub use config::{
    AcceptanceCriteria, CoveragePolicy, PipelineConfig, PollutantCatalog,
    DEFAULT_MIN_COMPLETENESS, DEFAULT_MIN_COVERAGE,
};
pub use error::ComputeError;
pub use pipeline::{run_pipeline, ExposurePipeline, PipelineOutput};
pub use qc::{QcReport, Verdict};
pub use registry::{SchoolRegistry, StationRegistry};
pub use types::{
    GeoPoint, Pollutant, RawReading, School, SchoolExposureDaily, SchoolStationMatch, Station,
    StationDaily, WeeklySummary,
};
pub use weekly::{select_week, WeekSelector, WeeklySummarizer};

/// Engine version embedded in every pipeline output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for pipeline outputs
pub const PRODUCER_NAME: &str = "school-exposure";
