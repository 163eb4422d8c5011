//! Error types for the exposure engine

use thiserror::Error;

/// Errors that can occur during computation
///
/// Per-record problems (unmapped codes, malformed timestamps, negative values)
/// are not errors: the validator drops those records and counts them. Only
/// configuration and I/O-level problems surface here.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Invalid week selector: {0}")]
    InvalidWeekSelector(String),

    #[error("No weekly data: {0}")]
    NoWeeklyData(String),
}
