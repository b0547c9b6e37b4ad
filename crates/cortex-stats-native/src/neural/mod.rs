//! Neural recordings and inter-trial reliability
//!
//! This module estimates how reliable each recorded channel is:
//! - [`recording`]: Repeated-trial spike recordings and their sources
//! - [`sampler`]: Random trial-pair correlation sampling
//! - [`null`]: Poisson and circular-shift null distributions
//! - [`normalizer`]: Cached per-session normalizers and significance queries

pub mod normalizer;
pub mod null;
pub mod recording;
pub mod sampler;

pub use normalizer::{NormalizerCalculator, NormalizerSource, SessionDistributions};
pub use null::NullDistributionGenerator;
pub use recording::{
    BinnedChannel, ChannelRecording, InMemoryRecordings, JsonRecordingSource, RecordingSource,
    SessionRecording, StimulusTrials,
};
pub use sampler::TrialPairSampler;
