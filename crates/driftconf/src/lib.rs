//! Layered configuration loading for Driftwave.
//!
//! Kept dependency-light so both the engine library and the CLI can import
//! it without pulling in the audio stack.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/driftwave/config.toml` (system)
//! 2. `~/.config/driftwave/config.toml` (user)
//! 3. `./driftwave.toml` (local override, or a path given on the CLI)
//! 4. Environment variables (`DRIFTWAVE_*`, plus `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! carrier = "productivity"
//! tone_gain = 0.3
//! analyser = true
//!
//! [session]
//! default_duration_seconds = 1200
//! tick_interval_ms = 250
//! max_context_age_seconds = 3600
//!
//! [telemetry]
//! log_level = "driftwave=debug"
//! ```

pub mod audio;
pub mod loader;
pub mod session;

pub use audio::{AudioConfig, CarrierName};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use session::{SessionConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Complete Driftwave configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DriftConfig {
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub telemetry: TelemetryConfig,
}

impl DriftConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./driftwave.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        Self::load_files(&files, |key| std::env::var(key).ok())
    }

    /// Merge the given files in order, then overlay env values from `env`.
    ///
    /// Split out from [`DriftConfig::load_with_sources_from`] so tests can
    /// supply their own file list and environment.
    pub fn load_files(
        files: &[PathBuf],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let origin = files.last().cloned().unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config: DriftConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin,
                message: e.to_string(),
            })?;

        loader::apply_env_overrides(&mut config, &mut sources, env)?;
        config.validate()?;

        Ok((config, sources))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8_000..=192_000).contains(&self.audio.sample_rate) {
            return Err(ConfigError::Invalid {
                field: "audio.sample_rate",
                message: format!("{} is outside 8000..=192000", self.audio.sample_rate),
            });
        }
        if !(0.0..=1.0).contains(&self.audio.tone_gain) {
            return Err(ConfigError::Invalid {
                field: "audio.tone_gain",
                message: format!("{} is outside 0.0..=1.0", self.audio.tone_gain),
            });
        }
        if !(0.0..=1.0).contains(&self.audio.noise_gain) {
            return Err(ConfigError::Invalid {
                field: "audio.noise_gain",
                message: format!("{} is outside 0.0..=1.0", self.audio.noise_gain),
            });
        }
        if !(0.0..=1.0).contains(&self.audio.chant_gain) {
            return Err(ConfigError::Invalid {
                field: "audio.chant_gain",
                message: format!("{} is outside 0.0..=1.0", self.audio.chant_gain),
            });
        }
        if self.audio.noise_buffer_seconds < 1.0 {
            return Err(ConfigError::Invalid {
                field: "audio.noise_buffer_seconds",
                message: "noise loop must be at least one second".to_string(),
            });
        }
        if self.audio.custom_carrier_hz.is_nan() || self.audio.custom_carrier_hz <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "audio.custom_carrier_hz",
                message: "carrier must be a positive frequency".to_string(),
            });
        }
        if self.session.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "session.tick_interval_ms",
                message: "tick interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let body = toml::to_string_pretty(self).unwrap_or_default();
        format!("# Driftwave Configuration\n\n{body}")
    }
}
