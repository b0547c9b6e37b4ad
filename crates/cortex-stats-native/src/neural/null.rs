//! Null (no-signal) correlation distributions
//!
//! Two generators are available:
//! - **Poisson**: pairs of independent Poisson spike trains with a matched
//!   rate and total duration. Any correlation between them is chance.
//! - **Shifts**: real repeat pairs with the second repeat circularly shifted,
//!   keeping the channel's spike statistics but breaking stimulus locking.

use cortex_stats_core::math;
use cortex_stats_core::{BinWidthMs, StatsError, StimulusSet};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use super::recording::BinnedChannel;
use super::sampler::TrialPairSampler;
use crate::config::StimulusDurations;
use crate::error::{AnalysisError, AnalysisResult};

/// Generates null correlation distributions.
#[derive(Clone, Debug)]
pub struct NullDistributionGenerator {
    sampler: TrialPairSampler,
    durations: StimulusDurations,
}

impl NullDistributionGenerator {
    /// Create a generator drawing `num_samples` pairs per distribution.
    #[must_use]
    pub fn new(num_samples: usize, durations: StimulusDurations) -> Self {
        Self {
            sampler: TrialPairSampler::new(num_samples),
            durations,
        }
    }

    /// Correlations between pairs of independent Poisson spike trains.
    ///
    /// Each train spans the stimulus set's total duration at `bin_width`
    /// with `rate_hz` mean firing. Bins where both trains are silent are
    /// dropped before correlating, as for real repeats.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidParameter`] for a non-positive rate and
    /// [`AnalysisError::Stats`] if fewer than two bins fit the duration.
    pub fn poisson_null<R: Rng + ?Sized>(
        &self,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
        rate_hz: f64,
        rng: &mut R,
    ) -> AnalysisResult<Vec<f64>> {
        let duration_ms = self.durations.duration_ms(stimulus);
        let bins = math::num_bins(duration_ms, bin_width);
        if bins < 2 {
            return Err(StatsError::InvalidBinWidth { bin_width_ms: bin_width, duration_ms }.into());
        }

        let lambda = rate_hz * f64::from(bin_width) / 1000.0;
        let poisson = Poisson::new(lambda).map_err(|e| {
            AnalysisError::invalid("rate_hz", format!("{rate_hz}Hz at {bin_width}ms: {e}"))
        })?;

        let mut first = vec![0.0; bins];
        let mut second = vec![0.0; bins];
        let mut dist = Vec::with_capacity(self.sampler.num_samples());
        for _ in 0..self.sampler.num_samples() {
            for (a, b) in first.iter_mut().zip(second.iter_mut()) {
                *a = poisson.sample(rng);
                *b = poisson.sample(rng);
            }
            let (a, b): (Vec<f64>, Vec<f64>) = first
                .iter()
                .zip(&second)
                .filter(|(a, b)| **a != 0.0 || **b != 0.0)
                .map(|(a, b)| (*a, *b))
                .unzip();
            if let Some(r) = math::pearson(&a, &b)? {
                dist.push(r);
            }
        }
        Ok(dist)
    }

    /// Correlations between circularly shifted repeat pairs of a channel.
    pub fn shift_null<R: Rng + ?Sized>(&self, channel: &BinnedChannel, rng: &mut R) -> Vec<f64> {
        self.sampler.shifted_distribution(channel, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator() -> NullDistributionGenerator {
        NullDistributionGenerator::new(
            200,
            StimulusDurations { standard_ms: 10_000.0, mvocs_ms: 5_000.0 },
        )
    }

    #[test]
    fn test_poisson_null_centered_near_zero() {
        let mut rng = StdRng::seed_from_u64(42);
        let dist = generator().poisson_null(50, StimulusSet::Standard, 20.0, &mut rng).unwrap();
        assert!(dist.len() > 150);
        let mean = math::mean(&dist).unwrap();
        assert!(mean.abs() < 0.1, "null mean {mean}");
        assert!(dist.iter().all(|r| (-1.0..=1.0).contains(r)));
    }

    #[test]
    fn test_poisson_null_is_deterministic_per_seed() {
        let a = generator()
            .poisson_null(20, StimulusSet::MVocs, 10.0, &mut StdRng::seed_from_u64(5))
            .unwrap();
        let b = generator()
            .poisson_null(20, StimulusSet::MVocs, 10.0, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_poisson_null_rejects_bad_parameters() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            generator().poisson_null(20, StimulusSet::Standard, 0.0, &mut rng),
            Err(AnalysisError::InvalidParameter { .. })
        ));
        assert!(matches!(
            generator().poisson_null(8_000, StimulusSet::MVocs, 10.0, &mut rng),
            Err(AnalysisError::Stats(StatsError::InvalidBinWidth { .. }))
        ));
    }
}
