//! Inter-trial correlation sampling
//!
//! The "true" distribution of a channel is built by repeatedly drawing two
//! distinct repeats of every stimulus, concatenating them into two long
//! responses and correlating the pair. Its mean is the channel's normalizer,
//! an estimate of how reliable the response is across repeats.

use cortex_stats_core::math;
use rand::Rng;

use super::recording::BinnedChannel;

/// Draws random trial pairs and collects their Pearson correlations.
#[derive(Clone, Copy, Debug)]
pub struct TrialPairSampler {
    num_samples: usize,
}

impl TrialPairSampler {
    /// Create a sampler drawing `num_samples` pairs per distribution.
    #[must_use]
    pub const fn new(num_samples: usize) -> Self {
        Self { num_samples }
    }

    /// Number of pairs drawn per distribution.
    #[must_use]
    pub const fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Correlations between random pairs of distinct repeats.
    ///
    /// Pairs where either response has zero variance are skipped, so the
    /// result may hold fewer than `num_samples` values (none for a silent
    /// channel).
    pub fn true_distribution<R: Rng + ?Sized>(
        &self,
        channel: &BinnedChannel,
        rng: &mut R,
    ) -> Vec<f64> {
        self.collect(channel, rng, BinnedChannel::draw_pair)
    }

    /// Correlations between random repeat pairs after circularly shifting the
    /// second repeat, which destroys stimulus locking but keeps spike counts.
    pub fn shifted_distribution<R: Rng + ?Sized>(
        &self,
        channel: &BinnedChannel,
        rng: &mut R,
    ) -> Vec<f64> {
        self.collect(channel, rng, BinnedChannel::draw_shifted_pair)
    }

    fn collect<R, D>(&self, channel: &BinnedChannel, rng: &mut R, draw: D) -> Vec<f64>
    where
        R: Rng + ?Sized,
        D: Fn(&BinnedChannel, &mut R) -> (Vec<f64>, Vec<f64>),
    {
        if channel.is_empty() {
            return Vec::new();
        }
        (0..self.num_samples)
            .filter_map(|_| {
                let (a, b) = draw(channel, rng);
                math::pearson(&a, &b).ok().flatten()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::recording::{ChannelRecording, StimulusTrials};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn locked_channel() -> BinnedChannel {
        // Identical repeats: every true pair correlates perfectly.
        let repeat = vec![5.0, 8.0, 45.0, 46.0, 47.0, 85.0];
        let recording = ChannelRecording {
            stimuli: vec![StimulusTrials {
                stimulus_id: "s1".to_string(),
                duration_ms: 100.0,
                repeats: vec![repeat.clone(), repeat.clone(), repeat],
            }],
        };
        BinnedChannel::from_recording(&recording, 20).unwrap()
    }

    #[test]
    fn test_identical_repeats_correlate_perfectly() {
        let sampler = TrialPairSampler::new(50);
        let mut rng = StdRng::seed_from_u64(1);
        let dist = sampler.true_distribution(&locked_channel(), &mut rng);
        assert_eq!(dist.len(), 50);
        assert!(dist.iter().all(|r| (r - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_silent_channel_yields_empty_distribution() {
        let recording = ChannelRecording {
            stimuli: vec![StimulusTrials {
                stimulus_id: "s1".to_string(),
                duration_ms: 100.0,
                repeats: vec![vec![], vec![]],
            }],
        };
        let binned = BinnedChannel::from_recording(&recording, 20).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(TrialPairSampler::new(10).true_distribution(&binned, &mut rng).is_empty());
    }

    #[test]
    fn test_same_seed_same_distribution() {
        let sampler = TrialPairSampler::new(20);
        let channel = locked_channel();
        let a = sampler.shifted_distribution(&channel, &mut StdRng::seed_from_u64(9));
        let b = sampler.shifted_distribution(&channel, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(a.iter().all(|r| *r < 1.0 - 1e-9));
    }
}
