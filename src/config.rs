//! Daemon configuration.
//!
//! Layered: built-in defaults, then the YAML config file, then
//! `PALISADE_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `PALISADE_CONTROLLER__BASE_URL`). CLI flags override on top in
//! `commands::daemon`.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Console API listen address.
    pub http_addr: String,
    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,
    pub controller: ControllerConfig,
    pub reconciler: ReconcilerSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub base_url: String,
    /// Bearer credential for the controller API. Invalidated in-process on
    /// the first 401; re-authentication is handled outside the daemon.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    /// Bounded inbound event queue drained by the reconciliation task.
    pub channel_capacity: usize,
    pub pending_timeout_secs: u64,
    pub sync_timeout_secs: u64,
    pub stale_check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// In-memory notification history kept for the console.
    pub history_limit: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9370".to_string(),
            log_level: "info".to_string(),
            controller: ControllerConfig::default(),
            reconciler: ReconcilerSettings::default(),
            notifications: NotificationSettings::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            token: None,
            request_timeout_secs: 10,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            pending_timeout_secs: 30,
            sync_timeout_secs: 120,
            stale_check_interval_secs: 5,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { history_limit: 200 }
    }
}

pub fn default_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("could not determine config directory")?;
    Ok(config_dir.join("palisade").join("config.yaml"))
}

/// Load configuration, optionally from an explicit file path.
///
/// A missing file is fine (defaults apply); a malformed one is an error.
pub fn load(path: Option<&str>) -> Result<DaemonConfig> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => default_path()?,
    };

    Figment::from(Serialized::defaults(DaemonConfig::default()))
        .merge(Yaml::file(&path))
        .merge(Env::prefixed("PALISADE_").split("__"))
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_file() {
        let config = load(Some("/nonexistent/palisade.yaml")).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9370");
        assert_eq!(config.reconciler.pending_timeout_secs, 30);
        assert!(config.controller.token.is_none());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "http_addr: 0.0.0.0:9000\ncontroller:\n  base_url: https://fleet.example.net\n  token: s3cret\nreconciler:\n  pending_timeout_secs: 7"
        )
        .unwrap();

        let config = load(file.path().to_str()).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:9000");
        assert_eq!(config.controller.base_url, "https://fleet.example.net");
        assert_eq!(config.controller.token.as_deref(), Some("s3cret"));
        assert_eq!(config.reconciler.pending_timeout_secs, 7);
        // Untouched sections keep defaults.
        assert_eq!(config.reconciler.sync_timeout_secs, 120);
        assert_eq!(config.notifications.history_limit, 200);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "http_addr: [not, a, string").unwrap();
        assert!(load(file.path().to_str()).is_err());
    }
}
