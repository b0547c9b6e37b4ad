//! Cortex Stats Native - Host-side correlation analysis
//!
//! This crate provides the analysis layer over stored prediction/response
//! correlations of auditory-cortex recordings:
//! - Bootstrap normalizers from repeated-trial recordings
//! - Poisson and circular-shift null distributions
//! - Threshold and statistical-inclusion significance policies
//! - Per-layer, per-bin-width and superset aggregation of result tables
//!
//! # Modules
//!
//! - [`neural`]: Recordings, trial-pair sampling, nulls, normalizer calculator
//! - [`correlations`]: Result tables, queries, enrichment and write-back
//! - [`significance`]: Significance policies and significance maps
//! - [`metadata`]: Area-to-session mapping
//! - [`architecture`]: DNN layer-type mapping
//! - [`config`]: YAML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod architecture;
pub mod config;
pub mod correlations;
pub mod error;
pub mod metadata;
pub mod neural;
pub mod significance;

// Re-export key types
pub use config::{AnalysisConfig, NormalizerConfig, StimulusDurations};
pub use correlations::{
    CorrelationRecord, CorrelationStore, Correlations, DistributionQuery, Metric, Selection,
    StrfCorrelations,
};
pub use error::{AnalysisError, AnalysisResult};
pub use metadata::{NeuralMetadata, RecordingMetadata};
pub use neural::{
    InMemoryRecordings, JsonRecordingSource, NormalizerCalculator, NormalizerSource,
    RecordingSource,
};
pub use significance::{SignificanceMap, SignificancePolicy};
