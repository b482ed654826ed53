//! Alert key and diagnostic target resolution.
//!
//! Instance names follow the usual Deployment pod naming, e.g.
//! `iems-goeu-job-59cb8dbcd4-c68tb` is pod `c68tb` of ReplicaSet `59cb8dbcd4`
//! for container `iems-goeu-job`. Only instances whose leading segments match
//! the configured prefixes are eligible for a heap dump.

use serde::{Deserialize, Serialize};

use crate::types::{Alert, AlertKey, DiagnosticTarget};

/// Derive the dedup key for an alert.
///
/// Returns `None` when the `instance` label is missing or empty. Such alerts
/// cannot be deduplicated and are never treated as already handled.
pub fn alert_key(alert: &Alert) -> Option<AlertKey> {
    alert
        .instance()
        .filter(|instance| !instance.is_empty())
        .map(AlertKey::new)
}

/// Naming convention mapping an instance name to its container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConvention {
    /// Literal leading segments the instance must start with
    pub prefixes: Vec<String>,
    /// Number of leading segments that form the container name
    pub segments: usize,
}

impl Default for TargetConvention {
    fn default() -> Self {
        Self {
            prefixes: vec!["iems".to_string(), "goeu".to_string()],
            segments: 3,
        }
    }
}

impl TargetConvention {
    /// Resolve the container name for an instance.
    ///
    /// Examples with the default convention:
    /// - `iems-goeu-job-59cb8dbcd4-c68tb` -> `iems-goeu-job`
    /// - `iems-goeu-job` -> `iems-goeu-job`
    /// - `foo-bar` -> `None`
    /// - `iems-other-job-abc` -> `None`
    #[must_use]
    pub fn resolve(&self, instance: &str) -> Option<DiagnosticTarget> {
        if self.segments == 0 {
            return None;
        }

        let parts: Vec<&str> = instance.split('-').collect();
        if parts.len() < self.segments {
            return None;
        }

        let head = &parts[..self.segments];
        if head.iter().any(|p| p.is_empty()) {
            return None;
        }

        let prefix_matches = self.prefixes.len() <= head.len()
            && self
                .prefixes
                .iter()
                .zip(head)
                .all(|(expected, actual)| expected == actual);
        if !prefix_matches {
            return None;
        }

        Some(DiagnosticTarget::new(head.join("-")))
    }
}
