//! TOML-based configuration for the consumer.
//!
//! The file lives at `$XDG_CONFIG_HOME/motionlink/consumer.toml`, or
//! `~/.config/motionlink/consumer.toml` when `XDG_CONFIG_HOME` is unset:
//!
//! ```toml
//! [consumer]
//! channel_name = "motionlink"
//! log_level = "info"
//! frame_rate_hz = 60
//!
//! [resampler]
//! enabled = true
//! latency_us = 5000
//!
//! [filter]
//! enabled = false
//! min_cutoff_freq = 4.7
//! beta = 0.01
//! ```
//!
//! Every field has a serde default, so an empty or partial file is valid and
//! a missing file yields [`ConsumerConfig::default`].

use std::path::{Path, PathBuf};

use motion_core::{FilterConfig, ResamplerConfig, ResamplerFactory};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine config directory")]
    NoConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level consumer configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsumerConfig {
    #[serde(default)]
    pub consumer: ConsumerSection,
    #[serde(default)]
    pub resampler: ResamplerConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// General consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerSection {
    /// Name used in log lines for the input channel.
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// Log level filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Display refresh rate driving frame deadlines.
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,
}

fn default_channel_name() -> String {
    "motionlink".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_frame_rate_hz() -> u32 {
    60
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            log_level: default_log_level(),
            frame_rate_hz: default_frame_rate_hz(),
        }
    }
}

impl ConsumerConfig {
    /// Resampling and filtering settings for the batching engine.
    pub fn resampler_factory(&self) -> ResamplerFactory {
        ResamplerFactory::new(self.resampler.clone(), self.filter.clone())
    }

    /// Checks values serde cannot constrain.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer.frame_rate_hz == 0 || self.consumer.frame_rate_hz > 1000 {
            return Err(ConfigError::Invalid(format!(
                "consumer.frame_rate_hz must be 1..=1000, got {}",
                self.consumer.frame_rate_hz
            )));
        }
        if self.resampler.min_delta_us > self.resampler.max_delta_us {
            return Err(ConfigError::Invalid(
                "resampler.min_delta_us exceeds resampler.max_delta_us".to_string(),
            ));
        }
        let cutoff = self.filter.min_cutoff_freq;
        if !(cutoff.is_finite() && cutoff > 0.0) || self.filter.beta < 0.0 {
            return Err(ConfigError::Invalid(
                "filter.min_cutoff_freq must be positive and filter.beta non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves `$XDG_CONFIG_HOME/motionlink/consumer.toml` (or `~/.config/...`).
///
/// # Errors
///
/// [`ConfigError::NoConfigDir`] if neither variable is set.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("motionlink").join("consumer.toml"))
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_from(path: &Path) -> Result<ConsumerConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<ConsumerConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConsumerConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_to(path: &Path, config: &ConsumerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
