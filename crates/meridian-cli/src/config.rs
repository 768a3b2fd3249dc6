//! Engine configuration loaded from TOML.
//!
//! ```toml
//! sample_rate = 48000.0
//! block_size = 256
//! blocks = 400
//!
//! [[branch]]
//! item_id = 1
//! latency_samples = 0
//! frequency_hz = 220.0
//!
//! [[branch]]
//! item_id = 2
//! latency_samples = 192
//! frequency_hz = 330.0
//! ```

use std::path::{Path, PathBuf};

use meridian_core::PlaybackConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// One source -> latency -> meter branch of the demo graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchConfig {
    /// Identity of the source. `0` marks it uncacheable.
    pub item_id: u64,
    /// Intrinsic latency of the branch's processor.
    pub latency_samples: usize,
    /// Sine frequency of the source.
    pub frequency_hz: f64,
    /// Sine amplitude of the source.
    pub amplitude: f32,
    /// Identity of the branch's meter. Defaults to `item_id`.
    pub meter_item_id: Option<u64>,
    /// Output channel count of the source.
    pub channels: usize,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            item_id: 1,
            latency_samples: 0,
            frequency_hz: 440.0,
            amplitude: 0.5,
            meter_item_id: None,
            channels: 2,
        }
    }
}

impl BranchConfig {
    /// Meter identity, falling back to the source identity.
    pub fn meter_id(&self) -> u64 {
        self.meter_item_id.unwrap_or(self.item_id)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Frames per block.
    pub block_size: usize,
    /// Allow nodes to alias single-consumer inputs.
    pub enable_node_memory_sharing: bool,
    /// Events each node output can hold per block.
    pub event_capacity: usize,
    /// Blocks to render.
    pub blocks: usize,
    /// Branches summed at the root.
    #[serde(rename = "branch")]
    pub branches: Vec<BranchConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            block_size: 256,
            enable_node_memory_sharing: true,
            event_capacity: 256,
            blocks: 400,
            branches: vec![
                BranchConfig {
                    item_id: 1,
                    latency_samples: 0,
                    frequency_hz: 220.0,
                    ..BranchConfig::default()
                },
                BranchConfig {
                    item_id: 2,
                    latency_samples: 192,
                    frequency_hz: 330.0,
                    ..BranchConfig::default()
                },
            ],
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Rejects values the graph cannot be prepared with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Validation("block_size must be non-zero".into()));
        }
        if self.branches.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[branch]] is required".into(),
            ));
        }
        if let Some(i) = self.branches.iter().position(|b| b.channels == 0) {
            return Err(ConfigError::Validation(format!(
                "branch {i} must have at least one channel"
            )));
        }
        Ok(())
    }

    /// In-process form passed to the graph.
    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            enable_node_memory_sharing: self.enable_node_memory_sharing,
            event_capacity: self.event_capacity,
        }
    }
}
