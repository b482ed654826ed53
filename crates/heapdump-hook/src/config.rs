//! Service configuration.
//!
//! Loaded from an optional JSON file; every field has a default matching the
//! historical behaviour, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::SuccessCriterion;
use crate::error::ConfigError;
use crate::resolve::TargetConvention;

/// Alert name that triggers a heap dump.
pub const DEFAULT_ALERT_NAME: &str = "HeapMemoryHighUsage";

/// Kubernetes namespace passed to the heap dump script.
pub const DEFAULT_NAMESPACE: &str = "project";

/// Default dedup window (one hour).
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 3600;

/// Heap dump webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Alert name to react to
    pub alert_name: String,
    /// Namespace argument for the heap dump script
    pub namespace: String,
    /// Program used to run the script
    pub interpreter: String,
    /// Heap dump script path
    pub script_path: PathBuf,
    /// File holding the persisted dedup record
    pub state_file: PathBuf,
    /// Seconds during which a handled instance is not dumped again
    pub dedup_window_secs: u64,
    /// Instance naming convention
    pub target: TargetConvention,
    /// How a finished script run is judged successful
    pub success_criterion: SuccessCriterion,
    /// Kill the script after this many seconds (no limit when unset)
    pub action_timeout_secs: Option<u64>,
    /// Maximum accepted webhook body size
    pub max_body_bytes: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            alert_name: DEFAULT_ALERT_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            interpreter: "bash".to_string(),
            script_path: PathBuf::from("heap_dump.sh"),
            state_file: PathBuf::from("/tmp/processed_alerts.json"),
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            target: TargetConvention::default(),
            success_criterion: SuccessCriterion::default(),
            action_timeout_secs: None,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl HookConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alert_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "alert_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.dedup_window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "dedup_window_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if window_from_secs(self.dedup_window_secs).is_none() {
            return Err(ConfigError::Invalid {
                field: "dedup_window_secs",
                reason: "too large".to_string(),
            });
        }
        if self.target.segments == 0 {
            return Err(ConfigError::Invalid {
                field: "target.segments",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.target.prefixes.len() > self.target.segments {
            return Err(ConfigError::Invalid {
                field: "target.prefixes",
                reason: format!(
                    "{} prefixes cannot fit in {} segments",
                    self.target.prefixes.len(),
                    self.target.segments
                ),
            });
        }
        if self.action_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "action_timeout_secs",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }

    /// Dedup window as a chrono duration.
    #[must_use]
    pub fn dedup_window(&self) -> chrono::Duration {
        window_from_secs(self.dedup_window_secs).unwrap_or(chrono::Duration::MAX)
    }

    #[must_use]
    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_secs.map(Duration::from_secs)
    }
}

fn window_from_secs(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HookConfig::default();
        assert_eq!(config.alert_name, "HeapMemoryHighUsage");
        assert_eq!(config.namespace, "project");
        assert_eq!(config.dedup_window(), chrono::Duration::hours(1));
        assert_eq!(config.success_criterion, SuccessCriterion::Strict);
        assert!(config.action_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"namespace": "prod", "dedup_window_secs": 600, "target": {"segments": 4}}"#,
        )
        .unwrap();

        let config = HookConfig::from_file(&path).unwrap();
        assert_eq!(config.namespace, "prod");
        assert_eq!(config.dedup_window_secs, 600);
        assert_eq!(config.target.segments, 4);
        assert_eq!(config.target.prefixes, vec!["iems", "goeu"]);
        assert_eq!(config.alert_name, DEFAULT_ALERT_NAME);
    }

    #[test]
    fn test_missing_file() {
        let err = HookConfig::from_file(Path::new("/nonexistent/heapdump.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HookConfig {
            dedup_window_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "dedup_window_secs", .. })
        ));

        config = HookConfig::default();
        config.target.segments = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "target.prefixes", .. })
        ));

        config = HookConfig {
            alert_name: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = HookConfig {
            action_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
