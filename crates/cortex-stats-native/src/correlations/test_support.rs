//! Fixtures shared by the store and enrichment tests.

use std::collections::{BTreeMap, BTreeSet};

use cortex_stats_core::math;
use cortex_stats_core::{BinWidthMs, ChannelId, NullMethod, SessionId, StimulusSet};

use crate::error::{AnalysisError, AnalysisResult};
use crate::metadata::{NeuralMetadata, RecordingMetadata};
use crate::neural::{NormalizerSource, SessionDistributions};
use crate::significance::{self, SignificanceMap};

/// Areas `core` = {191121, 200206} and `belt` = {180731}.
pub(crate) fn metadata() -> Box<dyn NeuralMetadata> {
    Box::new(RecordingMetadata::new(
        BTreeMap::from([
            (
                "core".to_string(),
                vec![SessionId::from("200206"), SessionId::from("191121")],
            ),
            ("belt".to_string(), vec![SessionId::from("180731")]),
        ]),
        Vec::new(),
    ))
}

/// Normalizer source with hand-written distributions and a pooled null.
#[derive(Default)]
pub(crate) struct FixedNormalizers {
    sessions: BTreeMap<(SessionId, BinWidthMs, StimulusSet), SessionDistributions>,
    pooled_null: Vec<f64>,
}

impl FixedNormalizers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_channel(
        mut self,
        session: &str,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
        channel: ChannelId,
        true_dist: &[f64],
        null_dist: &[f64],
    ) -> Self {
        let dists = self
            .sessions
            .entry((SessionId::from(session), bin_width, stimulus))
            .or_default();
        dists.true_dists.insert(channel, true_dist.to_vec());
        dists.null_dists.insert(channel, null_dist.to_vec());
        self
    }

    pub(crate) fn with_pooled_null(mut self, null: &[f64]) -> Self {
        self.pooled_null = null.to_vec();
        self
    }
}

impl NormalizerSource for FixedNormalizers {
    fn get_inter_trial_corr_dists_for_session(
        &mut self,
        session: &SessionId,
        bin_width: BinWidthMs,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionDistributions> {
        self.sessions
            .get(&(session.clone(), bin_width, stimulus))
            .cloned()
            .ok_or_else(|| AnalysisError::SessionNotFound { session: session.clone() })
    }

    fn get_normalizer_null_dist(
        &mut self,
        _bin_width: BinWidthMs,
        _stimulus: StimulusSet,
        _method: NullMethod,
    ) -> AnalysisResult<Vec<f64>> {
        Ok(self.pooled_null.clone())
    }

    fn get_significant_sessions_and_channels(
        &mut self,
        bin_width: BinWidthMs,
        p_threshold: f64,
        stimulus: StimulusSet,
        _method: NullMethod,
    ) -> AnalysisResult<SignificanceMap> {
        let threshold = significance::inclusion_threshold(&self.pooled_null, p_threshold)?;
        let mut significant = SignificanceMap::new();
        for ((session, bw, set), dists) in &self.sessions {
            if *bw != bin_width || *set != stimulus {
                continue;
            }
            let channels: BTreeSet<ChannelId> = dists
                .true_dists
                .iter()
                .filter(|(_, dist)| math::mean(dist).is_ok_and(|n| n > threshold))
                .map(|(&ch, _)| ch)
                .collect();
            if !channels.is_empty() {
                significant.insert(session.clone(), channels);
            }
        }
        Ok(significant)
    }
}
