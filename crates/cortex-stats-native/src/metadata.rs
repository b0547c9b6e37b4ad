//! Recording metadata
//!
//! Maps neural areas to recording sessions. The YAML layout is:
//!
//! ```yaml
//! area_wise_sessions:
//!   core: [200206, 191121]
//!   belt: [180731]
//! bad_sessions: [190726]
//! subject_wise_sessions:
//!   c_LH: [200206]
//! stim_wise_num_repeats:
//!   timit: 11
//!   mVocs: 15
//! ```
//!
//! Area `"all"` stands for every available session. Bad sessions are never
//! returned.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use cortex_stats_core::SessionId;
use serde::{Deserialize, Deserializer};

use crate::error::{AnalysisError, AnalysisResult};

/// Area name selecting every available session.
pub const ALL_AREAS: &str = "all";

/// Provider of area-to-session mappings.
pub trait NeuralMetadata {
    /// Sessions recorded in an area, ascending.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnknownArea`] for an area outside
    /// [`NeuralMetadata::get_area_choices`].
    fn get_all_sessions(&self, area: &str) -> AnalysisResult<Vec<SessionId>>;

    /// Valid area names, including `"all"`.
    fn get_area_choices(&self) -> Vec<String>;

    /// Every usable session, ascending.
    fn get_all_available_sessions(&self) -> Vec<SessionId>;
}

/// Session ids in YAML may be integers, floats or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSessionId {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawSessionId> for SessionId {
    fn from(raw: RawSessionId) -> Self {
        match raw {
            RawSessionId::Int(v) => SessionId::from(v.to_string()),
            RawSessionId::Float(v) => SessionId::from(format!("{v:.1}")),
            RawSessionId::Text(v) => SessionId::from(v),
        }
    }
}

fn session_list<'de, D>(deserializer: D) -> Result<Vec<SessionId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawSessionId>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(SessionId::from).collect())
}

fn session_lists<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<SessionId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<RawSessionId>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, ids)| (key, ids.into_iter().map(SessionId::from).collect()))
        .collect())
}

/// YAML-backed recording metadata.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecordingMetadata {
    #[serde(default, deserialize_with = "session_lists")]
    area_wise_sessions: BTreeMap<String, Vec<SessionId>>,
    #[serde(default, deserialize_with = "session_list")]
    bad_sessions: Vec<SessionId>,
    #[serde(default, deserialize_with = "session_lists")]
    subject_wise_sessions: BTreeMap<String, Vec<SessionId>>,
    #[serde(default)]
    stim_wise_num_repeats: BTreeMap<String, u32>,
}

impl RecordingMetadata {
    /// Load metadata from a YAML file.
    ///
    /// # Errors
    ///
    /// I/O and YAML errors.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| AnalysisError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse metadata from YAML text.
    ///
    /// # Errors
    ///
    /// YAML errors.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Build metadata from an area map and bad-session list.
    #[must_use]
    pub fn new(
        area_wise_sessions: BTreeMap<String, Vec<SessionId>>,
        bad_sessions: Vec<SessionId>,
    ) -> Self {
        Self { area_wise_sessions, bad_sessions, ..Self::default() }
    }

    /// Sessions of a subject (hemisphere), bad sessions excluded.
    #[must_use]
    pub fn get_subject_sessions(&self, subject: &str) -> Vec<SessionId> {
        self.usable(self.subject_wise_sessions.get(subject).into_iter().flatten())
    }

    /// Number of repeats per stimulus for a stimulus set name.
    #[must_use]
    pub fn num_repeats(&self, stimulus: &str) -> Option<u32> {
        self.stim_wise_num_repeats.get(stimulus).copied()
    }

    fn usable<'a>(&self, sessions: impl IntoIterator<Item = &'a SessionId>) -> Vec<SessionId> {
        let bad: BTreeSet<&SessionId> = self.bad_sessions.iter().collect();
        let unique: BTreeSet<&SessionId> =
            sessions.into_iter().filter(|s| !bad.contains(s)).collect();
        unique.into_iter().cloned().collect()
    }
}

impl NeuralMetadata for RecordingMetadata {
    fn get_all_sessions(&self, area: &str) -> AnalysisResult<Vec<SessionId>> {
        if area == ALL_AREAS {
            return Ok(self.get_all_available_sessions());
        }
        match self.area_wise_sessions.get(area) {
            Some(sessions) => Ok(self.usable(sessions)),
            None => Err(AnalysisError::UnknownArea {
                area: area.to_string(),
                choices: self.get_area_choices(),
            }),
        }
    }

    fn get_area_choices(&self) -> Vec<String> {
        let mut choices: Vec<String> = self.area_wise_sessions.keys().cloned().collect();
        choices.push(ALL_AREAS.to_string());
        choices.sort();
        choices.dedup();
        choices
    }

    fn get_all_available_sessions(&self) -> Vec<SessionId> {
        self.usable(self.area_wise_sessions.values().flatten())
    }
}
