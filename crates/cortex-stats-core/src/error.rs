//! Error types for statistical operations
//!
//! Works in `no_std` environments. Every variant carries enough context to
//! say which aggregate failed without needing heap allocation.

use core::fmt;

/// Errors from the statistics helpers in [`crate::math`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Aggregate requested over an empty (or all-NaN) sample
    EmptySample {
        /// Which aggregate was being computed
        operation: &'static str,
    },
    /// Two paired samples have different lengths
    LengthMismatch {
        /// Length of the first sample
        left: usize,
        /// Length of the second sample
        right: usize,
    },
    /// Percentile outside `[0, 100]`
    InvalidPercentile {
        /// Requested percentile
        percentile: f64,
    },
    /// Bin width does not fit into the trial duration at least once
    InvalidBinWidth {
        /// Bin width in ms
        bin_width_ms: u32,
        /// Trial duration in ms
        duration_ms: f64,
    },
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySample { operation } => {
                write!(f, "cannot compute {operation} of an empty sample")
            }
            Self::LengthMismatch { left, right } => {
                write!(f, "paired samples differ in length: {left} vs {right}")
            }
            Self::InvalidPercentile { percentile } => {
                write!(f, "percentile {percentile} outside [0, 100]")
            }
            Self::InvalidBinWidth { bin_width_ms, duration_ms } => {
                write!(
                    f,
                    "bin width {bin_width_ms}ms yields no complete bin in a {duration_ms}ms trial"
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StatsError {}
