//! DNN layer architectures
//!
//! Each model has an auxiliary `{model}_config.yml` listing its layers:
//!
//! ```yaml
//! layers:
//!   - layer_id: 0
//!     layer_name: conv1
//!     layer_type: conv
//!   - layer_id: 1
//!     layer_type: rnn
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cortex_stats_core::{LayerId, LayerType};
use serde::Deserialize;

use crate::error::{AnalysisError, AnalysisResult};

#[derive(Deserialize)]
struct ModelConfigFile {
    layers: Vec<LayerConfig>,
}

/// One layer entry of a model configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LayerConfig {
    /// Layer index as used in result tables
    pub layer_id: LayerId,
    /// Architecture category
    pub layer_type: LayerType,
    /// Human-readable layer name
    #[serde(default)]
    pub layer_name: Option<String>,
}

/// Layer-id to layer-type mapping of one model.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerArchitecture {
    model_name: String,
    layers: BTreeMap<LayerId, LayerType>,
}

impl LayerArchitecture {
    /// Path of a model's configuration file.
    #[must_use]
    pub fn config_path(aux_dir: &Path, model_name: &str) -> PathBuf {
        aux_dir.join(format!("{model_name}_config.yml"))
    }

    /// Load a model's architecture from the auxiliary directory.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnknownModel`] if `model_name` is not one of
    /// `valid_model_names`, plus I/O and YAML errors.
    pub fn load(
        aux_dir: &Path,
        model_name: &str,
        valid_model_names: &[String],
    ) -> AnalysisResult<Self> {
        if !valid_model_names.iter().any(|name| name == model_name) {
            return Err(AnalysisError::UnknownModel {
                model: model_name.to_string(),
                choices: valid_model_names.to_vec(),
            });
        }
        let path = Self::config_path(aux_dir, model_name);
        let text = std::fs::read_to_string(&path)
            .map_err(|source| AnalysisError::Io { path: path.clone(), source })?;
        Self::from_yaml_str(model_name, &text)
            .map_err(|source| AnalysisError::Yaml { path, source })
    }

    /// Parse an architecture from YAML text.
    ///
    /// # Errors
    ///
    /// YAML errors.
    pub fn from_yaml_str(model_name: &str, yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: ModelConfigFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(model_name, file.layers))
    }

    /// Build from layer entries.
    #[must_use]
    pub fn new(model_name: &str, layers: impl IntoIterator<Item = LayerConfig>) -> Self {
        Self {
            model_name: model_name.to_string(),
            layers: layers.into_iter().map(|l| (l.layer_id, l.layer_type)).collect(),
        }
    }

    /// Model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Category of a layer, if listed.
    #[must_use]
    pub fn layer_type(&self, layer: LayerId) -> Option<LayerType> {
        self.layers.get(&layer).copied()
    }

    /// Layers of a category, ascending.
    #[must_use]
    pub fn layers_of_type(&self, layer_type: LayerType) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|(_, t)| **t == layer_type)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
layers:
  - layer_id: 0
    layer_name: conv0
    layer_type: conv
  - layer_id: 1
    layer_type: conv
  - layer_id: 2
    layer_type: transformer
";

    #[test]
    fn test_parse_architecture() {
        let arch = LayerArchitecture::from_yaml_str("whisper_tiny", YAML).unwrap();
        assert_eq!(arch.layer_type(2), Some(LayerType::Transformer));
        assert_eq!(arch.layer_type(9), None);
        assert_eq!(arch.layers_of_type(LayerType::Conv), vec![0, 1]);
    }

    #[test]
    fn test_load_validates_model_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whisper_tiny_config.yml"), YAML).unwrap();
        let valid = vec!["whisper_tiny".to_string()];

        let arch = LayerArchitecture::load(dir.path(), "whisper_tiny", &valid).unwrap();
        assert_eq!(arch.model_name(), "whisper_tiny");

        assert!(matches!(
            LayerArchitecture::load(dir.path(), "gpt2", &valid),
            Err(AnalysisError::UnknownModel { .. })
        ));
    }
}
