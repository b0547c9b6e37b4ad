//! Error Types for Host-side Analysis
//!
//! Error types for table I/O, configuration, recordings and significance
//! queries using `thiserror`.

use std::path::PathBuf;

use cortex_stats_core::{SessionId, StatsError};
use thiserror::Error;

/// Analysis error types
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Filesystem error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Result table could not be read or parsed
    #[error("Failed to read correlation table {}: {source}", .path.display())]
    TableRead {
        /// Table path
        path: PathBuf,
        /// Underlying CSV error
        source: csv::Error,
    },

    /// Result table could not be written
    #[error("Failed to write correlation table {}: {source}", .path.display())]
    TableWrite {
        /// Table path
        path: PathBuf,
        /// Underlying CSV error
        source: csv::Error,
    },

    /// YAML document could not be parsed
    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        /// Document path
        path: PathBuf,
        /// Underlying YAML error
        source: serde_yaml::Error,
    },

    /// Recording JSON could not be parsed
    #[error("Invalid recording file {}: {source}", .path.display())]
    RecordingJson {
        /// Recording path
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// Neural area not known to the metadata provider
    #[error("Unknown neural area '{area}', valid choices: {}", .choices.join(", "))]
    UnknownArea {
        /// Requested area
        area: String,
        /// Valid areas
        choices: Vec<String>,
    },

    /// Model name not in the configured list of models
    #[error("Unknown model '{model}', valid choices: {}", .choices.join(", "))]
    UnknownModel {
        /// Requested model
        model: String,
        /// Valid model names
        choices: Vec<String>,
    },

    /// Session has no recording for the requested stimulus set
    #[error("No recording for session {session}")]
    SessionNotFound {
        /// Missing session
        session: SessionId,
    },

    /// Aggregate requested over an empty collection
    #[error("Empty distribution: {context}")]
    EmptyDistribution {
        /// What was being aggregated
        context: String,
    },

    /// Invalid argument or configuration value
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Reason
        reason: String,
    },

    /// Statistics error from the core crate
    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),
}

impl AnalysisError {
    /// Shorthand for [`AnalysisError::InvalidParameter`].
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter, reason: reason.into() }
    }

    /// Shorthand for [`AnalysisError::EmptyDistribution`].
    pub(crate) fn empty(context: impl Into<String>) -> Self {
        Self::EmptyDistribution { context: context.into() }
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
