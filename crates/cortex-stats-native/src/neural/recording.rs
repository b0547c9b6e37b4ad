//! Repeated-trial spike recordings
//!
//! A session holds, per channel, the spike times of every repeat of every
//! test stimulus. Recordings are read through the [`RecordingSource`] trait
//! so the normalizer calculator does not care whether they live in memory or
//! in per-session JSON files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cortex_stats_core::math;
use cortex_stats_core::{BinWidthMs, ChannelId, SessionId, StimulusSet};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

// ============================================================================
// Recording Types
// ============================================================================

/// Every repeat of a single stimulus on one channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulusTrials {
    /// Stimulus identifier (sentence or vocalization id)
    pub stimulus_id: String,
    /// Stimulus duration in ms
    pub duration_ms: f64,
    /// Spike times in ms from onset, one list per repeat
    pub repeats: Vec<Vec<f64>>,
}

/// One channel's responses to the test stimulus set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecording {
    /// Per-stimulus repeats
    pub stimuli: Vec<StimulusTrials>,
}

impl ChannelRecording {
    /// Mean firing rate in Hz over every repeat of every stimulus.
    #[must_use]
    pub fn mean_rate_hz(&self) -> f64 {
        let (spikes, duration_ms) = self.stimuli.iter().fold((0usize, 0.0), |(n, d), s| {
            let spikes: usize = s.repeats.iter().map(Vec::len).sum();
            (n + spikes, d + s.duration_ms * s.repeats.len() as f64)
        });
        if duration_ms > 0.0 {
            spikes as f64 / (duration_ms / 1000.0)
        } else {
            0.0
        }
    }
}

/// A session's recording for one stimulus set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecording {
    /// Session identifier
    pub session: SessionId,
    /// Stimulus set the repeats belong to
    #[serde(default)]
    pub stimulus_set: StimulusSet,
    /// Channel responses
    pub channels: BTreeMap<ChannelId, ChannelRecording>,
}

// ============================================================================
// Binned Repeats
// ============================================================================

/// Spike counts of a channel's repeats, per stimulus, with silent bins removed.
///
/// Stimuli with fewer than two repeats or no complete bin are dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinnedChannel {
    /// stimulus -> repeat -> active bins
    stimuli: Vec<Vec<Vec<f64>>>,
}

impl BinnedChannel {
    /// Bin a channel's repeats at the given width.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidParameter`] for a zero bin width.
    pub fn from_recording(
        recording: &ChannelRecording,
        bin_width: BinWidthMs,
    ) -> AnalysisResult<Self> {
        if bin_width == 0 {
            return Err(AnalysisError::invalid("bin_width", "must be positive"));
        }

        let mut stimuli = Vec::with_capacity(recording.stimuli.len());
        for stimulus in &recording.stimuli {
            if stimulus.repeats.len() < 2 || math::num_bins(stimulus.duration_ms, bin_width) == 0
            {
                continue;
            }
            let counts = stimulus
                .repeats
                .iter()
                .map(|spikes| math::bin_spike_times(spikes, stimulus.duration_ms, bin_width))
                .collect::<Result<Vec<_>, _>>()?;
            let active = math::active_bins(&counts);
            if active.is_empty() {
                continue;
            }
            stimuli.push(counts.iter().map(|c| math::select_bins(c, &active)).collect());
        }
        Ok(Self { stimuli })
    }

    /// Whether no stimulus contributes bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    /// Total number of active bins across stimuli.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.stimuli
            .iter()
            .filter_map(|repeats| repeats.first())
            .map(Vec::len)
            .sum()
    }

    /// Draw two distinct repeats per stimulus and concatenate them.
    pub fn draw_pair<R: Rng + ?Sized>(&self, rng: &mut R) -> (Vec<f64>, Vec<f64>) {
        self.draw(rng, false)
    }

    /// Like [`BinnedChannel::draw_pair`], with the second repeat circularly
    /// shifted by a random non-zero offset within each stimulus.
    ///
    /// Stimuli with a single active bin cannot be shifted and are left out
    /// of both vectors.
    pub fn draw_shifted_pair<R: Rng + ?Sized>(&self, rng: &mut R) -> (Vec<f64>, Vec<f64>) {
        self.draw(rng, true)
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R, shift: bool) -> (Vec<f64>, Vec<f64>) {
        let capacity = self.num_bins();
        let mut first = Vec::with_capacity(capacity);
        let mut second = Vec::with_capacity(capacity);

        for repeats in &self.stimuli {
            if shift && repeats.first().map_or(0, Vec::len) < 2 {
                continue;
            }
            let i = rng.gen_range(0..repeats.len());
            let mut j = rng.gen_range(0..repeats.len() - 1);
            if j >= i {
                j += 1;
            }
            first.extend_from_slice(&repeats[i]);

            let other = &repeats[j];
            if shift {
                let offset = rng.gen_range(1..other.len());
                second.extend_from_slice(&other[offset..]);
                second.extend_from_slice(&other[..offset]);
            } else {
                second.extend_from_slice(other);
            }
        }
        (first, second)
    }
}

// ============================================================================
// Recording Sources
// ============================================================================

/// Provider of session recordings.
pub trait RecordingSource {
    /// Sessions available from this source, sorted.
    ///
    /// # Errors
    ///
    /// Source-specific I/O errors.
    fn sessions(&self) -> AnalysisResult<Vec<SessionId>>;

    /// Load one session's recording for a stimulus set.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::SessionNotFound`] if the session has no recording for
    /// the stimulus set, or source-specific I/O errors.
    fn load_session(
        &self,
        session: &SessionId,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionRecording>;
}

/// Recordings held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordings {
    recordings: BTreeMap<(SessionId, StimulusSet), SessionRecording>,
}

impl InMemoryRecordings {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a recording.
    pub fn insert(&mut self, recording: SessionRecording) {
        self.recordings
            .insert((recording.session.clone(), recording.stimulus_set), recording);
    }

    /// Builder-style [`InMemoryRecordings::insert`].
    #[must_use]
    pub fn with(mut self, recording: SessionRecording) -> Self {
        self.insert(recording);
        self
    }
}

impl RecordingSource for InMemoryRecordings {
    fn sessions(&self) -> AnalysisResult<Vec<SessionId>> {
        let mut sessions: Vec<SessionId> = self.recordings.keys().map(|(s, _)| s.clone()).collect();
        sessions.dedup();
        Ok(sessions)
    }

    fn load_session(
        &self,
        session: &SessionId,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionRecording> {
        self.recordings
            .get(&(session.clone(), stimulus))
            .cloned()
            .ok_or_else(|| AnalysisError::SessionNotFound { session: session.clone() })
    }
}

/// Recordings stored as `{session}.json` / `{session}_mVocs.json` files.
#[derive(Clone, Debug)]
pub struct JsonRecordingSource {
    dir: PathBuf,
}

impl JsonRecordingSource {
    const MVOCS_SUFFIX: &'static str = "_mVocs";

    /// Read recordings from a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Recording directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a session's recording file.
    #[must_use]
    pub fn session_path(&self, session: &SessionId, stimulus: StimulusSet) -> PathBuf {
        match stimulus {
            StimulusSet::Standard => self.dir.join(format!("{session}.json")),
            StimulusSet::MVocs => self.dir.join(format!("{session}{}.json", Self::MVOCS_SUFFIX)),
        }
    }
}

impl RecordingSource for JsonRecordingSource {
    fn sessions(&self) -> AnalysisResult<Vec<SessionId>> {
        let io_err = |source| AnalysisError::Io { path: self.dir.clone(), source };
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let session = stem.strip_suffix(Self::MVOCS_SUFFIX).unwrap_or(stem);
                sessions.push(SessionId::from(session));
            }
        }
        sessions.sort();
        sessions.dedup();
        Ok(sessions)
    }

    fn load_session(
        &self,
        session: &SessionId,
        stimulus: StimulusSet,
    ) -> AnalysisResult<SessionRecording> {
        let path = self.session_path(session, stimulus);
        if !path.exists() {
            return Err(AnalysisError::SessionNotFound { session: session.clone() });
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|source| AnalysisError::Io { path: path.clone(), source })?;
        let mut recording: SessionRecording = serde_json::from_str(&text)
            .map_err(|source| AnalysisError::RecordingJson { path, source })?;
        recording.stimulus_set = stimulus;
        Ok(recording)
    }
}

// ============================================================================
// Tests
// ============================================================================
