use std::{fs, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::{
    engine::optimizer::OptimizerConfig,
    error::{NnError, Result},
};

/// Settings for a classifier training run, usually read from a TOML file.
///
/// ```toml
/// epochs = 10
/// batch_size = 64
///
/// [optimizer]
/// kind = "adam"
/// learning_rate = 0.001
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub optimizer: OptimizerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            hidden_size: 30,
            shuffle: true,
            seed: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&src)?;
        debug!(path = %path.display(), ?config, "loaded training config");
        Ok(config)
    }

    /// Checks the loop settings. Optimizer hyperparameters are validated when
    /// the optimizer is built.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NnError::InvalidShape("batch_size must be positive".into()));
        }
        if self.hidden_size == 0 {
            return Err(NnError::InvalidShape("hidden_size must be positive".into()));
        }
        Ok(())
    }
}
