//! Analysis configuration
//!
//! All directories, model names and resampling parameters are passed in
//! explicitly through [`AnalysisConfig`], loaded from a YAML file:
//!
//! ```yaml
//! saved_corr_dir: /data/results/cross_validated_correlations
//! aux_dir: /data/aux
//! recordings_dir: /data/recordings
//! metadata_path: /data/aux/recording_metadata.yml
//! valid_model_names: [wav2letter_modified, whisper_tiny]
//! threshold_percentile: 90
//! normalizer:
//!   seed: 7
//!   num_samples: 1000
//!   channel_null: poisson
//! ```

use std::path::{Path, PathBuf};

use cortex_stats_core::{NullMethod, StimulusSet};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Suffix of every correlation result table.
pub const CORR_FILE_SUFFIX: &str = "_corr_results.csv";

// ============================================================================
// Normalizer Configuration
// ============================================================================

/// Stimulus durations used to size simulated Poisson trials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusDurations {
    /// Total duration of the TIMIT test set in ms
    pub standard_ms: f64,
    /// Total duration of the monkey-vocalization test set in ms
    pub mvocs_ms: f64,
}

impl Default for StimulusDurations {
    fn default() -> Self {
        Self {
            standard_ms: 27_000.0,
            mvocs_ms: 18_000.0,
        }
    }
}

impl StimulusDurations {
    /// Duration of the given stimulus set in ms.
    #[must_use]
    pub fn duration_ms(&self, stimulus: StimulusSet) -> f64 {
        match stimulus {
            StimulusSet::Standard => self.standard_ms,
            StimulusSet::MVocs => self.mvocs_ms,
        }
    }
}

/// Resampling configuration of the normalizer calculator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Base seed; every (session, bin width, stimulus set) derives its own stream
    pub seed: u64,
    /// Number of random trial pairs per distribution
    pub num_samples: usize,
    /// Firing rate of the pooled Poisson null in Hz
    pub poisson_rate_hz: f64,
    /// Null used for the per-channel `null_mean` / `null_std` columns
    pub channel_null: NullMethod,
    /// Stimulus durations for Poisson trials
    pub durations: StimulusDurations,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_samples: 1000,
            poisson_rate_hz: 10.0,
            channel_null: NullMethod::Poisson,
            durations: StimulusDurations::default(),
        }
    }
}

impl NormalizerConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.num_samples == 0 {
            return Err(AnalysisError::invalid("num_samples", "must be at least 1"));
        }
        if !(self.poisson_rate_hz.is_finite() && self.poisson_rate_hz > 0.0) {
            return Err(AnalysisError::invalid(
                "poisson_rate_hz",
                format!("{} is not a positive rate", self.poisson_rate_hz),
            ));
        }
        for stimulus in StimulusSet::ALL {
            let duration = self.durations.duration_ms(stimulus);
            if !(duration.is_finite() && duration > 0.0) {
                return Err(AnalysisError::invalid(
                    "durations",
                    format!("{stimulus} duration {duration}ms must be positive"),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Top-level configuration: data locations, model names, defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory holding `{identifier}_corr_results.csv` tables
    pub saved_corr_dir: PathBuf,
    /// Directory holding `{model}_config.yml` architecture files
    pub aux_dir: PathBuf,
    /// Directory holding per-session recording files
    pub recordings_dir: PathBuf,
    /// Recording metadata YAML (areas, bad sessions)
    pub metadata_path: PathBuf,
    /// Models with a known layer architecture
    pub valid_model_names: Vec<String>,
    /// Default percentile for normalizer thresholds
    pub threshold_percentile: f64,
    /// Normalizer resampling parameters
    pub normalizer: NormalizerConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            saved_corr_dir: PathBuf::from("results/cross_validated_correlations"),
            aux_dir: PathBuf::from("aux"),
            recordings_dir: PathBuf::from("recordings"),
            metadata_path: PathBuf::from("aux/recording_metadata.yml"),
            valid_model_names: [
                "wav2letter_modified",
                "wav2vec2",
                "speech2text",
                "whisper_tiny",
                "whisper_base",
                "deepspeech2",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            threshold_percentile: 90.0,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a YAML configuration file.
    ///
    /// # Errors
    ///
    /// I/O and YAML errors, or any [`AnalysisConfig::validate`] failure.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| AnalysisError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> AnalysisResult<()> {
        if !(0.0..=100.0).contains(&self.threshold_percentile) {
            return Err(AnalysisError::invalid(
                "threshold_percentile",
                format!("{} outside [0, 100]", self.threshold_percentile),
            ));
        }
        self.normalizer.validate()
    }

    /// Path of the result table for a results identifier.
    #[must_use]
    pub fn corr_file_path(&self, identifier: &str) -> PathBuf {
        self.saved_corr_dir.join(format!("{identifier}{CORR_FILE_SUFFIX}"))
    }

    /// First configured model name contained in a results identifier.
    #[must_use]
    pub fn model_name_for(&self, identifier: &str) -> Option<&str> {
        self.valid_model_names
            .iter()
            .find(|name| identifier.contains(name.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_percentile, 90.0);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "saved_corr_dir: /tmp/corr\nnormalizer:\n  seed: 42\n  channel_null: shifts\n";
        let config: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.saved_corr_dir, PathBuf::from("/tmp/corr"));
        assert_eq!(config.normalizer.seed, 42);
        assert_eq!(config.normalizer.channel_null, NullMethod::Shifts);
        assert_eq!(config.normalizer.num_samples, 1000);
    }

    #[test]
    fn test_corr_file_path() {
        let config = AnalysisConfig {
            saved_corr_dir: PathBuf::from("/r"),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            config.corr_file_path("wav2letter_modified_trained_all_bins"),
            PathBuf::from("/r/wav2letter_modified_trained_all_bins_corr_results.csv")
        );
        assert_eq!(
            config.model_name_for("wav2letter_modified_trained_all_bins"),
            Some("wav2letter_modified")
        );
        assert_eq!(config.model_name_for("STRF_freqs80_all_lags"), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AnalysisConfig::default();
        config.threshold_percentile = 120.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.normalizer.poisson_rate_hz = 0.0;
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidParameter { parameter: "poisson_rate_hz", .. })
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "aux_dir: /aux\nthreshold_percentile: 95\n").unwrap();
        let config = AnalysisConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.aux_dir, PathBuf::from("/aux"));
        assert_eq!(config.threshold_percentile, 95.0);

        assert!(matches!(
            AnalysisConfig::from_yaml_file(dir.path().join("missing.yml")),
            Err(AnalysisError::Io { .. })
        ));
    }
}
