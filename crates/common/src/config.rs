//! Runtime configuration, loaded from JSON or built from defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default upper bound on a single schema's byte length (64 MiB).
pub const DEFAULT_MAX_SCHEMA_BYTES: usize = 64 * 1024 * 1024;

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the layout compiler and the mirroring protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Largest schema (in bytes) a class may register.
    pub max_schema_bytes: usize,
    /// Surface construction records with an unknown type tag as errors
    /// instead of warnings.
    pub strict_type_tags: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_schema_bytes: DEFAULT_MAX_SCHEMA_BYTES,
            strict_type_tags: cfg!(debug_assertions),
        }
    }
}

/// Top-level configuration for a crossframe process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of frames the game loop runs before shutting down.
    pub frames: u32,
    /// Fixed timestep in seconds.
    pub fixed_delta: f32,
    /// Number of mirrored entities the demo spawns.
    pub entities: usize,
    pub mirror: MirrorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames: 120,
            fixed_delta: 1.0 / 60.0,
            entities: 8,
            mirror: MirrorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration file. Missing keys take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded engine config");
        Ok(config)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_delta.is_finite() && self.fixed_delta > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_delta must be positive, got {}",
                self.fixed_delta
            )));
        }
        if self.mirror.max_schema_bytes == 0 {
            return Err(ConfigError::Invalid("max_schema_bytes must be non-zero".into()));
        }
        Ok(())
    }
}
