//! Configuration loading and typed config structures.
//!
//! The configuration lives in `waymark-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure and a loader that
//! reads, applies environment overrides, and validates the file. Every
//! section and field has a default, so an empty file is a valid config.

use std::path::Path;

use serde::Deserialize;

/// Environment variable that overrides `proximity.threshold_km`.
pub const THRESHOLD_ENV: &str = "WAYMARK_THRESHOLD_KM";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WaymarkConfig {
    /// Proximity threshold and alert text.
    #[serde(default)]
    pub proximity: ProximityConfig,

    /// Gating applied to fixes from the position source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Tracker loop parameters.
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WaymarkConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `WAYMARK_THRESHOLD_KM` overrides `proximity.threshold_km` when set
    /// to a parseable number.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::deserialize_yaml(&contents)?;
        config.proximity.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::deserialize_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn deserialize_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.proximity.threshold_km;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "proximity.threshold_km",
                reason: format!("must be a finite positive number, got {threshold}"),
            });
        }
        let min_distance = self.source.min_distance_m;
        if !min_distance.is_finite() || min_distance < 0.0 {
            return Err(ConfigError::Invalid {
                field: "source.min_distance_m",
                reason: format!("must be a finite non-negative number, got {min_distance}"),
            });
        }
        if self.tracker.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "tracker.queue_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Proximity threshold and alert text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProximityConfig {
    /// Great-circle distance in kilometres below which a marker counts as
    /// nearby. Exactly this distance counts as outside.
    #[serde(default = "default_threshold_km")]
    pub threshold_km: f64,

    /// Title of the alert fired when a marker is approached.
    #[serde(default = "default_alert_title")]
    pub alert_title: String,
}

impl ProximityConfig {
    /// Override the threshold from [`THRESHOLD_ENV`] when it parses.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(THRESHOLD_ENV)
            && let Ok(parsed) = val.trim().parse::<f64>()
        {
            self.threshold_km = parsed;
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            threshold_km: default_threshold_km(),
            alert_title: default_alert_title(),
        }
    }
}

/// Gating applied to fixes before they reach the tracker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    /// Minimum milliseconds between forwarded fixes.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Minimum movement in metres that forwards a fix regardless of
    /// `min_interval_ms`.
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f64,

    /// Drop fixes timestamped before the last accepted fix.
    #[serde(default = "default_true")]
    pub reject_stale: bool,

    /// Drop fixes timestamped more than this many milliseconds after the
    /// current time. Such a fix would otherwise make every later real fix
    /// look stale.
    #[serde(default = "default_max_future_skew_ms")]
    pub max_future_skew_ms: u64,
}

impl SourceConfig {
    /// Gating that forwards every fix, including stale and future ones.
    pub const fn passthrough() -> Self {
        Self {
            min_interval_ms: 0,
            min_distance_m: 0.0,
            reject_stale: false,
            max_future_skew_ms: u64::MAX,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
            reject_stale: true,
            max_future_skew_ms: default_max_future_skew_ms(),
        }
    }
}

/// Tracker loop parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerConfig {
    /// Capacity of the bounded input channel feeding the tracker loop.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    /// (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_threshold_km() -> f64 {
    0.05
}

fn default_alert_title() -> String {
    "You are near a marker!".to_owned()
}

const fn default_min_interval_ms() -> u64 {
    1000
}

const fn default_min_distance_m() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

const fn default_max_future_skew_ms() -> u64 {
    5000
}

const fn default_queue_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_owned()
}
