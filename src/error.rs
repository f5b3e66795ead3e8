//! Error types for the estimation pipeline.
//!
//! The taxonomy mirrors how failures propagate through the pipeline:
//!
//! - [`PipelineError::Schema`] / [`PipelineError::DataFormat`] /
//!   [`PipelineError::Mapping`] abort the current run. A partially cleaned
//!   table would corrupt the scaling statistics, so cleaning is fail-fast.
//! - [`PipelineError::GeocodingUnavailable`] is per-row recoverable: callers
//!   degrade the affected row to a null county and continue the batch.
//! - [`PipelineError::Training`] aborts a training run without touching any
//!   previously persisted model artifact.

use std::fmt;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type covering every pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    /// A required raw column is missing or structurally malformed.
    Schema {
        /// Name of the offending column
        column: String,
    },

    /// A numeric, currency, or date field could not be parsed.
    DataFormat {
        /// Field name
        field: String,
        /// The raw value that failed to parse
        value: String,
    },

    /// A categorical value has no defined numeric mapping.
    Mapping {
        /// Field name
        field: String,
        /// The unrecognized value
        value: String,
    },

    /// Invalid configuration (fractions, thresholds, bucket counts).
    Configuration(String),

    /// The geocoding collaborator failed for an address.
    ///
    /// Callers must degrade to a null county rather than aborting the batch.
    GeocodingUnavailable(String),

    /// A training run hit a numeric failure (non-finite loss).
    Training(String),

    /// Artifact serialization or array-shape failure.
    Artifact(String),

    /// Underlying CSV error.
    Csv(csv::Error),

    /// Underlying I/O error.
    Io(std::io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { column } => {
                write!(f, "Required column '{column}' is missing or malformed")
            }
            Self::DataFormat { field, value } => {
                write!(f, "Field '{field}' has unparseable value '{value}'")
            }
            Self::Mapping { field, value } => {
                write!(f, "Field '{field}' has unrecognized value '{value}'")
            }
            Self::Configuration(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::GeocodingUnavailable(msg) => write!(f, "Geocoding unavailable: {msg}"),
            Self::Training(msg) => write!(f, "Training aborted: {msg}"),
            Self::Artifact(msg) => write!(f, "Artifact error: {msg}"),
            Self::Csv(e) => write!(f, "CSV error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}
