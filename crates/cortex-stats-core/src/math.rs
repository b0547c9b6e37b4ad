//! Statistics utilities for correlation analysis (`no_std` compatible)
//!
//! This module provides:
//! - Descriptive statistics (mean, population std, median, percentiles)
//! - Pearson correlation with zero-variance exclusion
//! - Spike-time binning with a truncating tiling policy
//!
//! Percentiles use linear interpolation between closest ranks, the same
//! convention as numpy's default, so thresholds match the published analysis.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::StatsError;
use crate::types::BinWidthMs;

/// Variance below which a sample is treated as constant.
pub const ZERO_VARIANCE_EPS: f64 = 1e-12;

// ============================================================================
// Descriptive Statistics
// ============================================================================

/// Arithmetic mean.
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice.
pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptySample { operation: "mean" });
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`).
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice.
pub fn variance(values: &[f64]) -> Result<f64, StatsError> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Ok(sum_sq / values.len() as f64)
}

/// Population standard deviation.
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice.
pub fn std_dev(values: &[f64]) -> Result<f64, StatsError> {
    Ok(libm::sqrt(variance(values)?))
}

/// Median (mean of the two middle values for even lengths).
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice.
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    percentile(values, 50.0).map_err(|_| StatsError::EmptySample { operation: "median" })
}

/// Percentile in `[0, 100]` with linear interpolation.
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice and
/// [`StatsError::InvalidPercentile`] outside `[0, 100]`.
pub fn percentile(values: &[f64], percentile: f64) -> Result<f64, StatsError> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(StatsError::InvalidPercentile { percentile });
    }
    if values.is_empty() {
        return Err(StatsError::EmptySample { operation: "percentile" });
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let rank = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower = libm::floor(rank) as usize;
    let upper = libm::ceil(rank) as usize;
    let frac = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Quantile in `[0, 1]`; `quantile(v, 0.9) == percentile(v, 90.0)`.
///
/// # Errors
///
/// See [`percentile`].
pub fn quantile(values: &[f64], q: f64) -> Result<f64, StatsError> {
    percentile(values, q * 100.0)
}

/// Copy of the finite values of a sample (drops NaN and infinities).
#[must_use]
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Descriptive summary of a sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Summary {
    /// Number of values
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (`n - 1`), NaN for a single value
    pub std: f64,
    /// Minimum
    pub min: f64,
    /// 25th percentile
    pub q25: f64,
    /// Median
    pub median: f64,
    /// 75th percentile
    pub q75: f64,
    /// Maximum
    pub max: f64,
}

/// Count, mean, sample std, min, quartiles and max of a sample.
///
/// # Errors
///
/// [`StatsError::EmptySample`] for an empty slice.
pub fn describe(values: &[f64]) -> Result<Summary, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptySample { operation: "summary" });
    }
    let n = values.len();
    let std = if n > 1 {
        libm::sqrt(variance(values)? * n as f64 / (n - 1) as f64)
    } else {
        f64::NAN
    };
    Ok(Summary {
        count: n,
        mean: mean(values)?,
        std,
        min: percentile(values, 0.0)?,
        q25: percentile(values, 25.0)?,
        median: percentile(values, 50.0)?,
        q75: percentile(values, 75.0)?,
        max: percentile(values, 100.0)?,
    })
}

// ============================================================================
// Correlation
// ============================================================================

/// Pearson correlation coefficient.
///
/// Returns `None` when either sample has (near) zero variance or fewer than
/// two points, so silent responses never produce a NaN correlation.
///
/// # Errors
///
/// [`StatsError::LengthMismatch`] when the samples differ in length.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Option<f64>, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch { left: x.len(), right: y.len() });
    }
    if x.len() < 2 {
        return Ok(None);
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x < ZERO_VARIANCE_EPS || var_y < ZERO_VARIANCE_EPS {
        return Ok(None);
    }

    Ok(Some(cov / (libm::sqrt(var_x) * libm::sqrt(var_y))))
}

// ============================================================================
// Spike Binning
// ============================================================================

/// Number of complete bins in a trial; a trailing partial bin is dropped.
#[inline]
#[must_use]
pub fn num_bins(duration_ms: f64, bin_width_ms: BinWidthMs) -> usize {
    if bin_width_ms == 0 || duration_ms <= 0.0 {
        return 0;
    }
    libm::floor(duration_ms / f64::from(bin_width_ms)) as usize
}

/// Bin spike times (ms from stimulus onset) into counts.
///
/// Spikes before onset or inside the truncated trailing partial bin are
/// ignored.
///
/// # Errors
///
/// [`StatsError::InvalidBinWidth`] if not even one complete bin fits.
pub fn bin_spike_times(
    spike_times_ms: &[f64],
    duration_ms: f64,
    bin_width_ms: BinWidthMs,
) -> Result<Vec<f64>, StatsError> {
    let bins = num_bins(duration_ms, bin_width_ms);
    if bins == 0 {
        return Err(StatsError::InvalidBinWidth { bin_width_ms, duration_ms });
    }

    let width = f64::from(bin_width_ms);
    let mut counts = vec![0.0; bins];
    for &t in spike_times_ms {
        if t < 0.0 || !t.is_finite() {
            continue;
        }
        let idx = libm::floor(t / width) as usize;
        if idx < bins {
            counts[idx] += 1.0;
        }
    }
    Ok(counts)
}

/// Indices of bins that are non-zero in at least one trial.
///
/// Bins silent across every trial carry no variance and are excluded from
/// inter-trial correlations.
#[must_use]
pub fn active_bins(trials: &[Vec<f64>]) -> Vec<usize> {
    let len = trials.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .filter(|&i| trials.iter().any(|trial| trial[i] != 0.0))
        .collect()
}

/// Gather the given bin indices from a trial.
#[must_use]
pub fn select_bins(trial: &[f64], bins: &[usize]) -> Vec<f64> {
    bins.iter().map(|&i| trial[i]).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((mean(&values).unwrap() - 3.0).abs() < 1e-12);
        // Population variance: 10 / 5
        assert!((variance(&values).unwrap() - 2.0).abs() < 1e-12);
        assert!((std_dev(&values).unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_aggregates_fail() {
        assert_eq!(mean(&[]), Err(StatsError::EmptySample { operation: "mean" }));
        assert_eq!(median(&[]), Err(StatsError::EmptySample { operation: "median" }));
        assert!(percentile(&[], 90.0).is_err());
    }

    #[test]
    fn test_median() {
        assert!((median(&[0.5, 0.6]).unwrap() - 0.55).abs() < 1e-12);
        assert!((median(&[0.3]).unwrap() - 0.3).abs() < 1e-12);
        assert!((median(&[3.0, 1.0, 2.0]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        // rank = 0.9 * 3 = 2.7 -> 3 + 0.7
        assert!((percentile(&values, 90.0).unwrap() - 3.7).abs() < 1e-12);
        assert!((percentile(&values, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0).unwrap() - 4.0).abs() < 1e-12);
        assert!((quantile(&values, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert!(percentile(&values, 101.0).is_err());
    }

    #[test]
    fn test_describe() {
        let summary = describe(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert!((summary.mean - 2.5).abs() < 1e-12);
        assert!((summary.min - 1.0).abs() < 1e-12);
        assert!((summary.q25 - 1.75).abs() < 1e-12);
        assert!((summary.max - 4.0).abs() < 1e-12);
        // Sample variance: 5 / 3
        assert!((summary.std - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);

        assert!(describe(&[0.5]).unwrap().std.is_nan());
        assert!(describe(&[]).is_err());
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson(&x, &y).unwrap().unwrap() - 1.0).abs() < 1e-12);

        let neg = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&x, &neg).unwrap().unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_zero_variance_is_none() {
        let x = [1.0, 2.0, 3.0];
        let silent = [0.0, 0.0, 0.0];
        assert_eq!(pearson(&x, &silent).unwrap(), None);
        assert!(pearson(&x, &[1.0]).is_err());
    }

    #[test]
    fn test_binning_truncates_partial_bin() {
        // 105ms at 20ms -> 5 bins, spikes at 100ms+ are dropped.
        let counts = bin_spike_times(&[1.0, 19.9, 20.0, 99.0, 101.0, -3.0], 105.0, 20).unwrap();
        assert_eq!(counts, vec![2.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(num_bins(105.0, 20), 5);
        assert!(bin_spike_times(&[1.0], 10.0, 20).is_err());
    }

    #[test]
    fn test_active_bins_skip_silence() {
        let trials = vec![vec![0.0, 1.0, 0.0, 2.0], vec![0.0, 0.0, 0.0, 1.0]];
        let bins = active_bins(&trials);
        assert_eq!(bins, vec![1, 3]);
        assert_eq!(select_bins(&trials[0], &bins), vec![1.0, 2.0]);
    }
}
