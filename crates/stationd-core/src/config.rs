//! Daemon configuration (spec §6 Configuration).
//!
//! Loaded once at startup from `${STATIOND_CONFIG_DIR}/config.json`
//! (default `${HOME}/.stationd/`), falling back to the defaults below for
//! any key the file omits or when the file does not exist at all — a fresh
//! `stationd` install should come up with sane behavior and no config file.

use crate::error::{ErrorKind, Result, StationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Base/cap/attempt policy for the scheduler's retry/backoff (spec §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_ms: 2_000,
            cap_ms: 60_000,
            max_attempts: 5,
        }
    }
}

fn default_port() -> u16 {
    8947
}

fn default_global_concurrency() -> usize {
    8
}

fn default_per_kind_concurrency() -> BTreeMap<String, usize> {
    let mut m = BTreeMap::new();
    m.insert("launch".to_string(), 3);
    m.insert("apply-template".to_string(), 2);
    m
}

fn default_instance_retention_minutes() -> i64 {
    60
}

fn default_idle_evaluation_interval_seconds() -> u64 {
    60
}

fn default_stopped_cost_ratio() -> f64 {
    0.10
}

fn default_config_dir_label() -> String {
    ".stationd".to_string()
}

/// Process-wide configuration (spec §6).
///
/// Every field has a documented default so that `DaemonConfig::default()`
/// alone is a legal configuration — a config file only needs to name the
/// keys it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Port the HTTP API listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of operations running concurrently, daemon-wide.
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,

    /// Per-[`crate::domain::OperationKind`] concurrency ceilings, keyed by
    /// [`crate::domain::OperationKind::as_str`]. Kinds absent from this map
    /// are bounded only by `global_concurrency`.
    #[serde(default = "default_per_kind_concurrency")]
    pub per_kind_concurrency: BTreeMap<String, usize>,

    /// How long a terminal [`crate::domain::Operation`] is retained before
    /// the retention sweep purges it.
    #[serde(default = "default_instance_retention_minutes")]
    pub instance_retention_minutes: i64,

    /// Interval between idle-policy evaluation ticks.
    #[serde(default = "default_idle_evaluation_interval_seconds")]
    pub idle_evaluation_interval_seconds: u64,

    /// Fraction of the running cost rate billed while stopped/hibernated
    /// (storage-only charge), per spec §4.D.
    #[serde(default = "default_stopped_cost_ratio")]
    pub stopped_cost_ratio: f64,

    /// Default retry/backoff policy, used unless an operation kind
    /// specifies its own.
    #[serde(default)]
    pub default_retry: RetryPolicyConfig,

    #[serde(skip)]
    loaded_from: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            global_concurrency: default_global_concurrency(),
            per_kind_concurrency: default_per_kind_concurrency(),
            instance_retention_minutes: default_instance_retention_minutes(),
            idle_evaluation_interval_seconds: default_idle_evaluation_interval_seconds(),
            stopped_cost_ratio: default_stopped_cost_ratio(),
            default_retry: RetryPolicyConfig::default(),
            loaded_from: None,
        }
    }
}

impl DaemonConfig {
    /// The directory stationd reads its config from and writes its durable
    /// state under, honoring `STATIOND_CONFIG_DIR` (spec §6) and falling
    /// back to `${HOME}/.stationd`.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("STATIOND_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(default_config_dir_label())
    }

    /// Load configuration from `<config_dir>/config.json`, falling back to
    /// [`DaemonConfig::default`] entirely when the file is absent. A file
    /// that exists but fails to parse is a startup error: it almost always
    /// indicates a typo the operator should see immediately rather than a
    /// silently-ignored override.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_dir())
    }

    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut config: DaemonConfig = serde_json::from_str(&raw).map_err(|err| {
            StationError::new(
                ErrorKind::Validation,
                format!("failed to parse {}: {err}", path.display()),
            )
        })?;
        config.loaded_from = Some(path);
        Ok(config)
    }

    /// Per-kind concurrency ceiling for the given operation kind, falling
    /// back to `global_concurrency` when the kind has no specific entry.
    pub fn concurrency_for(&self, kind: &str) -> usize {
        self.per_kind_concurrency
            .get(kind)
            .copied()
            .unwrap_or(self.global_concurrency)
    }

    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_spec_values() {
        let config = DaemonConfig::default();
        assert_eq!(config.port, 8947);
        assert_eq!(config.global_concurrency, 8);
        assert_eq!(config.per_kind_concurrency.get("launch"), Some(&3));
        assert_eq!(config.per_kind_concurrency.get("apply-template"), Some(&2));
        assert_eq!(config.instance_retention_minutes, 60);
        assert_eq!(config.idle_evaluation_interval_seconds, 60);
        assert!((config.stopped_cost_ratio - 0.10).abs() < 1e-9);
        assert_eq!(config.default_retry.base_ms, 2_000);
        assert_eq!(config.default_retry.cap_ms, 60_000);
        assert_eq!(config.default_retry.max_attempts, 5);
    }

    #[test]
    fn load_from_missing_dir_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.port, default_port());
        assert!(config.loaded_from().is_none());
    }

    #[test]
    fn load_from_partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"port": 9000}"#).unwrap();
        let config = DaemonConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.global_concurrency, default_global_concurrency());
        assert!(config.loaded_from().is_some());
    }

    #[test]
    fn concurrency_for_falls_back_to_global() {
        let config = DaemonConfig::default();
        assert_eq!(config.concurrency_for("launch"), 3);
        assert_eq!(config.concurrency_for("stop"), config.global_concurrency);
    }
}
