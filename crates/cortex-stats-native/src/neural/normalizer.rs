//! Normalizer calculator
//!
//! Computes, per (session, bin width, stimulus set), every channel's true
//! inter-trial correlation distribution and a null distribution, and answers
//! statistical-inclusion queries against pooled or per-channel nulls.
//!
//! Results are cached for the calculator's lifetime. Every computation unit
//! draws from its own RNG stream derived from the configured seed and the
//! unit's key, so results do not depend on query order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use cortex_stats_core::math;
use cortex_stats_core::{BinWidthMs, ChannelId, ChannelStats, NullMethod, SessionId, StimulusSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::null::NullDistributionGenerator;
use super::recording::{BinnedChannel, RecordingSource, SessionRecording};
use super::sampler::TrialPairSampler;
use crate::config::NormalizerConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::significance::{self, SignificanceMap};

// ============================================================================
// Session Distributions
// ============================================================================

/// True and null correlation samples of every channel in a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionDistributions {
    /// Inter-trial correlations per channel
    pub true_dists: BTreeMap<ChannelId, Vec<f64>>,
    /// Null correlations per channel
    pub null_dists: BTreeMap<ChannelId, Vec<f64>>,
}

impl SessionDistributions {
    /// Normalizer and null statistics of a channel.
    ///
    /// Each scalar is computed on its own distribution: an empty true
    /// distribution (silent or unrepeated channel) gives a NaN normalizer, an
    /// empty null gives NaN `null_mean` / `null_std`. Downstream policies
    /// treat NaN as unreliable.
    #[must_use]
    pub fn channel_stats(&self, channel: ChannelId) -> Option<ChannelStats> {
        let true_dist = self.true_dists.get(&channel)?;
        let null_dist = self.null_dists.get(&channel).map_or(&[][..], Vec::as_slice);
        Some(ChannelStats::new(
            math::mean(true_dist).unwrap_or(f64::NAN),
            math::mean(null_dist).unwrap_or(f64::NAN),
            math::std_dev(null_dist).unwrap_or(f64::NAN),
        ))
    }

    /// Statistics of every channel, ascending by channel.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<ChannelId, ChannelStats> {
        self.true_dists
            .keys()
            .filter_map(|&ch| self.channel_stats(ch).map(|s| (ch, s)))
            .collect()
    }
}

// ============================================================================
// Normalizer Source
// ============================================================================

/// Inter-trial statistics consumed by the result store.
pub trait NormalizerSource {
    /// True and null distributions of every channel of a session.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::SessionNotFound`] if the session has no recording for
    /// the stimulus set.
    fn get_inter_trial_corr_dists_for_session(
        &mut self,
        session: &SessionId,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionDistributions>;

    /// Pooled null distribution of normalizers at a bin width.
    ///
    /// # Errors
    ///
    /// Parameter or recording errors.
    fn get_normalizer_null_dist(
        &mut self,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
        method: NullMethod,
    ) -> AnalysisResult<Vec<f64>>;

    /// Channels whose normalizer exceeds the `1 - p_threshold` quantile of
    /// the chosen null.
    ///
    /// # Errors
    ///
    /// Invalid `p_threshold`, parameter or recording errors.
    fn get_significant_sessions_and_channels(
        &mut self,
        bin_width: BinWidthMs,
        p_threshold: f64,
        stimulus: StimulusSet,
        method: NullMethod,
    ) -> AnalysisResult<SignificanceMap>;
}

// ============================================================================
// Calculator
// ============================================================================

type UnitKey = (SessionId, BinWidthMs, StimulusSet);

/// Bootstrap normalizer calculator over a recording source.
pub struct NormalizerCalculator<S: RecordingSource> {
    config: NormalizerConfig,
    source: S,
    sampler: TrialPairSampler,
    generator: NullDistributionGenerator,
    recordings: HashMap<(SessionId, StimulusSet), Rc<SessionRecording>>,
    session_cache: HashMap<UnitKey, SessionDistributions>,
    shift_cache: HashMap<UnitKey, BTreeMap<ChannelId, Vec<f64>>>,
    poisson_cache: HashMap<(BinWidthMs, StimulusSet), Vec<f64>>,
}

impl<S: RecordingSource> NormalizerCalculator<S> {
    /// Create a calculator.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidParameter`] for an invalid configuration.
    pub fn new(config: NormalizerConfig, source: S) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self {
            sampler: TrialPairSampler::new(config.num_samples),
            generator: NullDistributionGenerator::new(config.num_samples, config.durations.clone()),
            config,
            source,
            recordings: HashMap::new(),
            session_cache: HashMap::new(),
            shift_cache: HashMap::new(),
            poisson_cache: HashMap::new(),
        })
    }

    /// Calculator configuration.
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Sessions available from the recording source.
    ///
    /// # Errors
    ///
    /// Source I/O errors.
    pub fn sessions(&self) -> AnalysisResult<Vec<SessionId>> {
        self.source.sessions()
    }

    /// True distributions plus the configured per-channel null for a session.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::SessionNotFound`] and recording errors.
    pub fn get_inter_trial_corr_dists_for_session(
        &mut self,
        session: &SessionId,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<&SessionDistributions> {
        let key = (session.clone(), bin_width, stimulus);
        if !self.session_cache.contains_key(&key) {
            let recording = self.recording(session, stimulus)?;
            let dists = self.compute_session_dists(&recording, bin_width, stimulus)?;
            self.session_cache.insert(key.clone(), dists);
        }
        self.session_cache
            .get(&key)
            .ok_or_else(|| AnalysisError::SessionNotFound { session: session.clone() })
    }

    /// Per-channel circular-shift null of a session.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::SessionNotFound`] and recording errors.
    pub fn shift_null(
        &mut self,
        session: &SessionId,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<&BTreeMap<ChannelId, Vec<f64>>> {
        let key = (session.clone(), bin_width, stimulus);
        if !self.shift_cache.contains_key(&key) {
            let recording = self.recording(session, stimulus)?;
            let mut rng = self.rng_for("shifts", session.as_str(), bin_width, stimulus);
            let mut nulls = BTreeMap::new();
            for (&channel, channel_rec) in &recording.channels {
                let binned = BinnedChannel::from_recording(channel_rec, bin_width)?;
                nulls.insert(channel, self.generator.shift_null(&binned, &mut rng));
            }
            self.shift_cache.insert(key.clone(), nulls);
        }
        self.shift_cache
            .get(&key)
            .ok_or_else(|| AnalysisError::SessionNotFound { session: session.clone() })
    }

    /// Pooled Poisson null at the configured firing rate.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::Stats`] if the bin width does not fit the stimulus
    /// duration twice.
    pub fn get_normalizer_null_dist_using_poisson(
        &mut self,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<&[f64]> {
        let key = (bin_width, stimulus);
        if !self.poisson_cache.contains_key(&key) {
            let mut rng = self.rng_for("poisson", "", bin_width, stimulus);
            let dist = self.generator.poisson_null(
                bin_width,
                stimulus,
                self.config.poisson_rate_hz,
                &mut rng,
            )?;
            debug!(bin_width, %stimulus, samples = dist.len(), "Pooled Poisson null ready");
            self.poisson_cache.insert(key, dist);
        }
        self.poisson_cache
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| AnalysisError::empty(format!("Poisson null at {bin_width}ms")))
    }

    /// Channels whose normalizer exceeds the pooled Poisson null's
    /// `1 - p_threshold` quantile.
    ///
    /// # Errors
    ///
    /// Invalid `p_threshold`, parameter or recording errors.
    pub fn get_significant_sessions_and_channels_using_poisson_null(
        &mut self,
        bin_width: BinWidthMs,
        p_threshold: f64,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SignificanceMap> {
        let threshold = significance::inclusion_threshold(
            self.get_normalizer_null_dist_using_poisson(bin_width, stimulus)?,
            p_threshold,
        )?;

        let mut significant = SignificanceMap::new();
        for session in self.source.sessions()? {
            let dists = match self.get_inter_trial_corr_dists_for_session(&session, bin_width, stimulus)
            {
                Ok(dists) => dists,
                Err(AnalysisError::SessionNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            let channels: BTreeSet<ChannelId> = dists
                .true_dists
                .iter()
                .filter(|(_, dist)| math::mean(dist).is_ok_and(|normalizer| normalizer > threshold))
                .map(|(&ch, _)| ch)
                .collect();
            if !channels.is_empty() {
                significant.insert(session, channels);
            }
        }

        info!(
            bin_width,
            p_threshold,
            %stimulus,
            sessions = significant.len(),
            channels = significance::channel_count(&significant),
            "Significant channels against Poisson null"
        );
        Ok(significant)
    }

    /// Channels whose normalizer exceeds the `1 - p_threshold` quantile of
    /// their own circular-shift null.
    ///
    /// # Errors
    ///
    /// Invalid `p_threshold`, parameter or recording errors.
    pub fn get_significant_sessions_and_channels_using_shifts_null(
        &mut self,
        bin_width: BinWidthMs,
        p_threshold: f64,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SignificanceMap> {
        significance::validate_p_threshold(p_threshold)?;

        let mut significant = SignificanceMap::new();
        for session in self.source.sessions()? {
            let normalizers: BTreeMap<ChannelId, f64> =
                match self.get_inter_trial_corr_dists_for_session(&session, bin_width, stimulus) {
                    Ok(dists) => dists
                        .true_dists
                        .iter()
                        .filter_map(|(&ch, dist)| math::mean(dist).ok().map(|n| (ch, n)))
                        .collect(),
                    Err(AnalysisError::SessionNotFound { .. }) => continue,
                    Err(e) => return Err(e),
                };
            let nulls = self.shift_null(&session, bin_width, stimulus)?;

            let mut channels = BTreeSet::new();
            for (ch, normalizer) in normalizers {
                let Some(null) = nulls.get(&ch) else { continue };
                if math::finite(null).is_empty() {
                    continue;
                }
                if significance::admits(normalizer, null, p_threshold)? {
                    channels.insert(ch);
                }
            }
            if !channels.is_empty() {
                significant.insert(session, channels);
            }
        }

        info!(
            bin_width,
            p_threshold,
            %stimulus,
            sessions = significant.len(),
            channels = significance::channel_count(&significant),
            "Significant channels against shifted-trial null"
        );
        Ok(significant)
    }

    fn recording(
        &mut self,
        session: &SessionId,
        stimulus: StimulusSet,
    ) -> AnalysisResult<Rc<SessionRecording>> {
        let key = (session.clone(), stimulus);
        if let Some(recording) = self.recordings.get(&key) {
            return Ok(Rc::clone(recording));
        }
        let recording = Rc::new(self.source.load_session(session, stimulus)?);
        self.recordings.insert(key, Rc::clone(&recording));
        Ok(recording)
    }

    fn compute_session_dists(
        &self,
        recording: &SessionRecording,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionDistributions> {
        let session = recording.session.as_str();
        let mut rng = self.rng_for("dists", session, bin_width, stimulus);
        let mut dists = SessionDistributions::default();

        for (&channel, channel_rec) in &recording.channels {
            let binned = BinnedChannel::from_recording(channel_rec, bin_width)?;
            let true_dist = self.sampler.true_distribution(&binned, &mut rng);
            if true_dist.is_empty() {
                warn!(session, channel, bin_width, "No usable repeat pairs, channel is unreliable");
            }

            let null_dist = match self.config.channel_null {
                NullMethod::Poisson => {
                    let rate_hz = channel_rec.mean_rate_hz();
                    if rate_hz > 0.0 {
                        self.generator.poisson_null(bin_width, stimulus, rate_hz, &mut rng)?
                    } else {
                        Vec::new()
                    }
                }
                NullMethod::Shifts => self.generator.shift_null(&binned, &mut rng),
            };

            dists.true_dists.insert(channel, true_dist);
            dists.null_dists.insert(channel, null_dist);
        }

        debug!(
            session,
            bin_width,
            %stimulus,
            channels = dists.true_dists.len(),
            "Inter-trial distributions computed"
        );
        Ok(dists)
    }

    fn rng_for(
        &self,
        stream: &str,
        label: &str,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> StdRng {
        StdRng::seed_from_u64(unit_seed(self.config.seed, stream, label, bin_width, stimulus))
    }
}

impl<S: RecordingSource> NormalizerSource for NormalizerCalculator<S> {
    fn get_inter_trial_corr_dists_for_session(
        &mut self,
        session: &SessionId,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionDistributions> {
        NormalizerCalculator::get_inter_trial_corr_dists_for_session(self, session, bin_width, stimulus)
            .cloned()
    }

    fn get_normalizer_null_dist(
        &mut self,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
        method: NullMethod,
    ) -> AnalysisResult<Vec<f64>> {
        match method {
            NullMethod::Poisson => self
                .get_normalizer_null_dist_using_poisson(bin_width, stimulus)
                .map(<[f64]>::to_vec),
            NullMethod::Shifts => {
                let mut pooled = Vec::new();
                for session in self.source.sessions()? {
                    match self.shift_null(&session, bin_width, stimulus) {
                        Ok(nulls) => pooled.extend(nulls.values().flatten().copied()),
                        Err(AnalysisError::SessionNotFound { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(pooled)
            }
        }
    }

    fn get_significant_sessions_and_channels(
        &mut self,
        bin_width: BinWidthMs,
        p_threshold: f64,
        stimulus: StimulusSet,
        method: NullMethod,
    ) -> AnalysisResult<SignificanceMap> {
        match method {
            NullMethod::Poisson => self.get_significant_sessions_and_channels_using_poisson_null(
                bin_width,
                p_threshold,
                stimulus,
            ),
            NullMethod::Shifts => self.get_significant_sessions_and_channels_using_shifts_null(
                bin_width,
                p_threshold,
                stimulus,
            ),
        }
    }
}

/// FNV-1a over the unit key, mixed with the base seed.
fn unit_seed(
    base: u64,
    stream: &str,
    label: &str,
    bin_width: BinWidthMs,
    stimulus: StimulusSet,
) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let stimulus_tag: u8 = match stimulus {
        StimulusSet::Standard => 0,
        StimulusSet::MVocs => 1,
    };
    let bytes = base
        .to_le_bytes()
        .into_iter()
        .chain(stream.bytes())
        .chain([b'/'])
        .chain(label.bytes())
        .chain(bin_width.to_le_bytes())
        .chain([stimulus_tag]);

    bytes.fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

// ============================================================================
// Tests
// ============================================================================
