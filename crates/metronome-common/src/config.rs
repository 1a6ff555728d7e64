//! Configuration structures for the scheduler.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Real-time scheduling configuration.
    pub realtime: RealtimeConfig,

    /// Timeliness monitoring configuration.
    pub timeliness: TimelinessConfig,

    /// Metrics collection configuration.
    pub metrics: MetricsConfig,
}

/// Real-time scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Elevate dispatch threads to a real-time scheduling class.
    /// Requires privileges; degrades with a warning when denied.
    pub enabled: bool,

    /// Scheduler policy used for elevated tasks: "fifo" or "rr".
    pub policy: SchedPolicy,

    /// Lock all memory pages (mlockall) on first start.
    pub lock_memory: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: SchedPolicy::Fifo,
            lock_memory: false,
        }
    }
}

/// Scheduler policy for real-time dispatch threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: first-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: round-robin real-time.
    Rr,
    /// SCHED_OTHER: normal time-sharing (non-RT).
    Other,
}

/// Timeliness monitoring configuration.
///
/// A task invocation is a deadline violation when its measured interval
/// exceeds `period + tolerance`. One violation warns; `warn_threshold`
/// consecutive violations fault the whole scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelinessConfig {
    /// Enable per-task timeliness monitoring.
    pub enabled: bool,

    /// Fixed jitter tolerance. When unset, the tolerance is one full
    /// period of the monitored task.
    #[serde(with = "humantime_serde_opt", skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Duration>,

    /// Consecutive violations before the monitor enters FAULTED and the
    /// scheduler is stopped.
    pub warn_threshold: u32,
}

impl Default for TimelinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance: None,
            warn_threshold: 3,
        }
    }
}

/// Metrics collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable per-task interval metrics.
    pub enabled: bool,

    /// Size of the interval histogram ring buffer.
    pub histogram_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_size: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Option<Duration>` using humantime format.
mod humantime_serde_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
