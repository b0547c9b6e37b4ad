//! Significance policies
//!
//! A (session, channel) pair is kept for analysis when it is reliable enough
//! to interpret. Two policies are supported:
//!
//! - **Threshold**: `normalizer > 0` and
//!   `normalizer > null_mean + multiplier * null_std`, using the statistics
//!   stored with each result row.
//! - **Statistical inclusion**: `normalizer` above the `1 - p_threshold`
//!   quantile of a null distribution. Lowering `p_threshold` raises the
//!   quantile, so the admitted set can only shrink.

use std::collections::{BTreeMap, BTreeSet};

use cortex_stats_core::math;
use cortex_stats_core::{ChannelId, NullMethod, SessionId, StimulusSet};

use crate::correlations::CorrelationRecord;
use crate::error::{AnalysisError, AnalysisResult};

/// Significant channels per session, both ascending.
pub type SignificanceMap = BTreeMap<SessionId, BTreeSet<ChannelId>>;

/// How significant channels are chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SignificancePolicy {
    /// Stored-statistics threshold with a caller-supplied multiplier
    Threshold {
        /// Multiplier `k` of the null standard deviation
        multiplier: f64,
    },
    /// Quantile test against a null distribution
    StatisticalInclusion {
        /// Significance level in `(0, 1)`
        p_threshold: f64,
        /// Null distribution to test against
        null_method: NullMethod,
    },
}

impl SignificancePolicy {
    /// Threshold policy with multiplier `k`.
    #[must_use]
    pub const fn threshold(multiplier: f64) -> Self {
        Self::Threshold { multiplier }
    }

    /// Statistical inclusion against the pooled Poisson null.
    #[must_use]
    pub const fn poisson(p_threshold: f64) -> Self {
        Self::StatisticalInclusion { p_threshold, null_method: NullMethod::Poisson }
    }
}

/// Check `p_threshold` lies in `(0, 1)`.
///
/// # Errors
///
/// [`AnalysisError::InvalidParameter`] otherwise.
pub fn validate_p_threshold(p_threshold: f64) -> AnalysisResult<()> {
    if p_threshold > 0.0 && p_threshold < 1.0 {
        Ok(())
    } else {
        Err(AnalysisError::invalid(
            "p_threshold",
            format!("{p_threshold} outside (0, 1)"),
        ))
    }
}

/// The `1 - p_threshold` quantile of the finite values of a null.
///
/// # Errors
///
/// Invalid `p_threshold`, or [`AnalysisError::EmptyDistribution`] when the
/// null has no finite values.
pub fn inclusion_threshold(null: &[f64], p_threshold: f64) -> AnalysisResult<f64> {
    validate_p_threshold(p_threshold)?;
    let finite = math::finite(null);
    if finite.is_empty() {
        return Err(AnalysisError::empty("null distribution"));
    }
    Ok(math::quantile(&finite, 1.0 - p_threshold)?)
}

/// Whether a normalizer is admitted against a null at `p_threshold`.
///
/// # Errors
///
/// See [`inclusion_threshold`].
pub fn admits(normalizer: f64, null: &[f64], p_threshold: f64) -> AnalysisResult<bool> {
    Ok(normalizer > inclusion_threshold(null, p_threshold)?)
}

/// Rows passing the threshold policy for a stimulus set.
///
/// Rows without stored statistics never pass.
pub fn get_highly_tuned_channels<'a, I>(
    rows: I,
    multiplier: f64,
    stimulus: StimulusSet,
) -> Vec<&'a CorrelationRecord>
where
    I: IntoIterator<Item = &'a CorrelationRecord>,
{
    rows.into_iter()
        .filter(|row| row.passes_threshold(multiplier, stimulus))
        .collect()
}

/// Whether a (session, channel) pair is in a significance map.
#[must_use]
pub fn contains(map: &SignificanceMap, session: &SessionId, channel: ChannelId) -> bool {
    map.get(session).is_some_and(|channels| channels.contains(&channel))
}

/// Total number of (session, channel) pairs.
#[must_use]
pub fn channel_count(map: &SignificanceMap) -> usize {
    map.values().map(BTreeSet::len).sum()
}

/// Union of several significance maps.
#[must_use]
pub fn union<'a, I>(maps: I) -> SignificanceMap
where
    I: IntoIterator<Item = &'a SignificanceMap>,
{
    let mut merged = SignificanceMap::new();
    for map in maps {
        for (session, channels) in map {
            merged.entry(session.clone()).or_default().extend(channels);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_stats_core::ChannelStats;
    use proptest::prelude::*;

    fn row(channel: ChannelId, stats: Option<ChannelStats>) -> CorrelationRecord {
        let mut record = CorrelationRecord {
            session: SessionId::from("200206"),
            channel,
            bin_width: 20,
            ..CorrelationRecord::default()
        };
        if let Some(stats) = stats {
            record.set_stats(StimulusSet::Standard, stats);
        }
        record
    }

    #[test]
    fn test_threshold_policy_filters_rows() {
        let rows = vec![
            row(0, Some(ChannelStats::new(0.25, 0.05, 0.02))),
            row(1, Some(ChannelStats::new(0.08, 0.05, 0.02))),
            row(2, Some(ChannelStats::new(-0.1, -0.5, 0.01))),
            row(3, None),
        ];
        let tuned = get_highly_tuned_channels(&rows, 3.0, StimulusSet::Standard);
        let channels: Vec<_> = tuned.iter().map(|r| r.channel).collect();
        assert_eq!(channels, vec![0]);
        // mVocs statistics are absent on every row
        assert!(get_highly_tuned_channels(&rows, 0.0, StimulusSet::MVocs).is_empty());
    }

    #[test]
    fn test_inclusion_threshold() {
        let null = [0.0, 0.1, 0.2, 0.3, f64::NAN];
        // 0.9 quantile of [0, .1, .2, .3]: rank 2.7
        assert!((inclusion_threshold(&null, 0.1).unwrap() - 0.27).abs() < 1e-12);
        assert!(admits(0.271, &null, 0.1).unwrap());
        assert!(!admits(0.269, &null, 0.1).unwrap());
        assert!(inclusion_threshold(&[f64::NAN], 0.1).is_err());
        assert!(inclusion_threshold(&null, 1.0).is_err());
    }

    #[test]
    fn test_map_helpers() {
        let session = SessionId::from("200206");
        let a = SignificanceMap::from([(session.clone(), BTreeSet::from([1, 3]))]);
        let b = SignificanceMap::from([
            (session.clone(), BTreeSet::from([2])),
            (SessionId::from("191121"), BTreeSet::from([0])),
        ]);
        let merged = union([&a, &b]);
        assert_eq!(channel_count(&merged), 4);
        assert!(contains(&merged, &session, 2));
        assert!(!contains(&merged, &SessionId::from("191121"), 5));
    }

    proptest! {
        #[test]
        fn prop_inclusion_is_monotone_in_p(
            null in prop::collection::vec(-1.0f64..1.0, 1..200),
            normalizer in -1.0f64..1.0,
            p1 in 0.001f64..0.999,
            p2 in 0.001f64..0.999,
        ) {
            let (strict, loose) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
            if admits(normalizer, &null, strict).unwrap() {
                prop_assert!(admits(normalizer, &null, loose).unwrap());
            }
        }

        #[test]
        fn prop_threshold_policy_rejects_weak_channels(
            stats in prop::collection::vec((-1.0f64..1.0, -0.5f64..0.5, 0.0f64..0.3), 0..50),
            multiplier in 0.0f64..5.0,
        ) {
            let rows: Vec<_> = stats
                .iter()
                .enumerate()
                .map(|(i, &(n, m, s))| row(i as ChannelId, Some(ChannelStats::new(n, m, s))))
                .collect();
            for tuned in get_highly_tuned_channels(&rows, multiplier, StimulusSet::Standard) {
                let s = tuned.stats(StimulusSet::Standard).unwrap();
                prop_assert!(s.normalizer > 0.0);
                prop_assert!(s.normalizer > s.null_mean + multiplier * s.null_std);
            }
        }
    }
}
