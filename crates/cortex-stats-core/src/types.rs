//! Core types for auditory-cortex correlation analysis
//!
//! This module provides the identifiers and small value types shared by the
//! normalizer, significance and query layers:
//! - Session, channel, layer and bin-width identifiers
//! - Stimulus sets (TIMIT vs. monkey vocalizations) and their column families
//! - DNN layer architecture categories
//! - Per-channel normalizer / null statistics

use alloc::format;
use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::math;

/// Recording channel index within a session.
pub type ChannelId = u32;

/// DNN layer index (0 for STRF baselines).
pub type LayerId = u32;

/// Spike-count bin width in milliseconds.
pub type BinWidthMs = u32;

// ============================================================================
// Session Identifier
// ============================================================================

/// Recording session identifier, e.g. `"200206"`.
///
/// Result tables written by pandas store sessions as floats (`200206.0`);
/// integral numeric spellings are normalized so both compare equal.
///
/// ```
/// use cortex_stats_core::types::SessionId;
///
/// assert_eq!(SessionId::from("200206.0"), SessionId::from("200206"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id, normalizing integral float spellings.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() && libm::trunc(value) == value && trimmed.contains('.') => {
                Self(format!("{}", value as i64))
            }
            _ => Self(String::from(trimmed)),
        }
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Stimulus Sets and Column Families
// ============================================================================

/// Test stimulus set a correlation was measured on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusSet {
    /// TIMIT sentences
    #[default]
    Standard,
    /// Monkey vocalizations
    #[serde(rename = "mVocs")]
    MVocs,
}

impl StimulusSet {
    /// Both stimulus sets, standard first.
    pub const ALL: [Self; 2] = [Self::Standard, Self::MVocs];

    /// Map a `--mvocs` style flag to a stimulus set.
    #[inline]
    #[must_use]
    pub const fn from_mvocs_flag(mvocs: bool) -> Self {
        if mvocs {
            Self::MVocs
        } else {
            Self::Standard
        }
    }

    /// Persisted column names for this stimulus set.
    #[must_use]
    pub const fn columns(self) -> ColumnSet {
        match self {
            Self::Standard => ColumnSet {
                test_cc_raw: "test_cc_raw",
                normalized_test_cc: "normalized_test_cc",
                normalizer: "normalizer",
                null_mean: "null_mean",
                null_std: "null_std",
            },
            Self::MVocs => ColumnSet {
                test_cc_raw: "mVocs_test_cc_raw",
                normalized_test_cc: "mVocs_normalized_test_cc",
                normalizer: "mVocs_normalizer",
                null_mean: "mVocs_null_mean",
                null_std: "mVocs_null_std",
            },
        }
    }
}

impl fmt::Display for StimulusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("timit"),
            Self::MVocs => f.write_str("mVocs"),
        }
    }
}

/// Names of the columns holding one stimulus set's correlation statistics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColumnSet {
    /// Raw Pearson correlation between prediction and response
    pub test_cc_raw: &'static str,
    /// Raw correlation divided by `sqrt(normalizer)`
    pub normalized_test_cc: &'static str,
    /// Mean inter-trial correlation
    pub normalizer: &'static str,
    /// Mean of the null distribution
    pub null_mean: &'static str,
    /// Standard deviation of the null distribution
    pub null_std: &'static str,
}

// ============================================================================
// Layer Architecture
// ============================================================================

/// Coarse architecture category of a DNN layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    /// Convolutional layer
    Conv,
    /// Recurrent layer
    Rnn,
    /// Transformer block
    Transformer,
    /// Mixed / other
    Mix,
}

impl LayerType {
    /// All categories in plotting order.
    pub const ALL: [Self; 4] = [Self::Conv, Self::Rnn, Self::Transformer, Self::Mix];

    /// Lowercase name as persisted in result tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::Rnn => "rnn",
            Self::Transformer => "transformer",
            Self::Mix => "mix",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Null Method
// ============================================================================

/// How a null (no-signal) correlation distribution is generated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullMethod {
    /// Independent Poisson spike trains with matched rate and duration
    #[default]
    Poisson,
    /// Real repeated trials with random circular shifts
    Shifts,
}

impl fmt::Display for NullMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poisson => f.write_str("poisson"),
            Self::Shifts => f.write_str("shifts"),
        }
    }
}

// ============================================================================
// Channel Statistics
// ============================================================================

/// Normalizer and null statistics of one (session, channel, bin width).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Mean of the true inter-trial correlation distribution
    pub normalizer: f64,
    /// Mean of the null distribution
    pub null_mean: f64,
    /// Population standard deviation of the null distribution
    pub null_std: f64,
}

impl ChannelStats {
    /// Create from precomputed scalars.
    #[must_use]
    pub const fn new(normalizer: f64, null_mean: f64, null_std: f64) -> Self {
        Self { normalizer, null_mean, null_std }
    }

    /// Summarize a channel's true and null correlation samples.
    ///
    /// # Errors
    ///
    /// [`StatsError::EmptySample`] if either distribution is empty.
    pub fn from_distributions(true_dist: &[f64], null_dist: &[f64]) -> Result<Self, StatsError> {
        Ok(Self {
            normalizer: math::mean(true_dist)?,
            null_mean: math::mean(null_dist)?,
            null_std: math::std_dev(null_dist)?,
        })
    }

    /// Whether the normalizer can be used for sqrt-normalization.
    #[inline]
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.normalizer > 0.0
    }

    /// Threshold policy: `normalizer > 0` and
    /// `normalizer > null_mean + multiplier * null_std`.
    #[inline]
    #[must_use]
    pub fn passes_threshold(&self, multiplier: f64) -> bool {
        self.is_usable() && self.normalizer > self.null_mean + multiplier * self.null_std
    }

    /// Noise-corrected correlation `raw / sqrt(normalizer)`.
    ///
    /// Returns NaN when the normalizer is not strictly positive.
    #[inline]
    #[must_use]
    pub fn normalize(&self, raw: f64) -> f64 {
        if self.is_usable() {
            raw / libm::sqrt(self.normalizer)
        } else {
            f64::NAN
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_normalizes_float_spelling() {
        assert_eq!(SessionId::from("200206.0").as_str(), "200206");
        assert_eq!(SessionId::from(" 191121 ").as_str(), "191121");
        assert_eq!(SessionId::from("sess-a").as_str(), "sess-a");
    }

    #[test]
    fn test_session_id_keeps_leading_zero_integers() {
        // No decimal point, so the text is kept verbatim.
        assert_eq!(SessionId::from("0123").as_str(), "0123");
    }

    #[test]
    fn test_column_families() {
        assert_eq!(StimulusSet::Standard.columns().normalizer, "normalizer");
        assert_eq!(StimulusSet::MVocs.columns().normalizer, "mVocs_normalizer");
        assert_eq!(StimulusSet::MVocs.columns().test_cc_raw, "mVocs_test_cc_raw");
        assert_eq!(StimulusSet::from_mvocs_flag(true), StimulusSet::MVocs);
    }

    #[test]
    fn test_threshold_policy_example() {
        let stats = ChannelStats::new(0.25, 0.05, 0.02);
        assert!(stats.passes_threshold(3.0));
        assert!(!stats.passes_threshold(10.0));
        assert!((stats.normalize(0.4) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_normalizer() {
        let zero = ChannelStats::new(0.0, -1.0, 0.0);
        assert!(!zero.passes_threshold(0.0));
        assert!(zero.normalize(0.3).is_nan());

        let negative = ChannelStats::new(-0.1, -1.0, 0.1);
        assert!(!negative.passes_threshold(1.0));
        assert!(negative.normalize(0.3).is_nan());
    }

    #[test]
    fn test_from_distributions() {
        let stats = ChannelStats::from_distributions(&[0.2, 0.4], &[0.0, 0.1, -0.1]).unwrap();
        assert!((stats.normalizer - 0.3).abs() < 1e-12);
        assert!(stats.null_mean.abs() < 1e-12);
        assert!(stats.null_std > 0.0);

        assert!(ChannelStats::from_distributions(&[], &[0.0]).is_err());
    }
}
