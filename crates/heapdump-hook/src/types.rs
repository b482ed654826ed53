//! Alert types received from Alertmanager and the identifiers derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Status of an individual alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Condition is currently active
    Firing,
    /// Condition has cleared
    Resolved,
    /// Missing or unrecognised status
    #[default]
    #[serde(other)]
    Other,
}

/// Individual alert from Alertmanager.
///
/// Only `status` and `labels` drive decisions and are typed. Annotations,
/// timestamps and the rest are carried as raw JSON so an odd value there
/// never rejects the alert.
///
/// Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: AlertStatus,
    /// Alert labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations
    #[serde(default)]
    pub annotations: Option<Value>,
    /// When the alert started firing
    #[serde(default)]
    pub starts_at: Option<Value>,
    /// Unique fingerprint for this alert
    #[serde(default)]
    pub fingerprint: Option<Value>,
    /// Any other fields the sender included
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Alert {
    /// Get the alert name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    /// Get the instance label.
    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.labels.get("instance").map(String::as_str)
    }

    /// Get the fingerprint when it was sent as a string.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_ref().and_then(Value::as_str)
    }

    /// Check if this is a firing alert.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}

/// Deduplication identity of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertKey(String);

impl AlertKey {
    /// Wrap a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Container name handed to the heap dump action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiagnosticTarget(String);

impl DiagnosticTarget {
    pub(crate) fn new(name: String) -> Self {
        Self(name)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiagnosticTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alertmanager_alert() {
        let alert: Alert = serde_json::from_value(serde_json::json!({
            "status": "firing",
            "labels": {
                "alertname": "HeapMemoryHighUsage",
                "instance": "iems-goeu-job-59cb8dbcd4-c68tb"
            },
            "annotations": { "summary": "heap above 90%" },
            "startsAt": "2024-05-01T10:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z",
            "generatorURL": "http://prometheus/graph",
            "fingerprint": "4a1e3f"
        }))
        .unwrap();

        assert!(alert.is_firing());
        assert_eq!(alert.name(), Some("HeapMemoryHighUsage"));
        assert_eq!(alert.instance(), Some("iems-goeu-job-59cb8dbcd4-c68tb"));
        assert_eq!(alert.fingerprint(), Some("4a1e3f"));
        assert!(alert.extra.contains_key("endsAt"));
    }

    #[test]
    fn test_status_variants() {
        let parse = |v: serde_json::Value| serde_json::from_value::<Alert>(v).unwrap().status;

        assert_eq!(parse(serde_json::json!({"status": "resolved"})), AlertStatus::Resolved);
        assert_eq!(parse(serde_json::json!({"status": "pending"})), AlertStatus::Other);
        assert_eq!(parse(serde_json::json!({})), AlertStatus::Other);
    }

    #[test]
    fn test_free_form_fields_accept_any_shape() {
        let alert: Alert = serde_json::from_value(serde_json::json!({
            "status": "firing",
            "labels": {"alertname": "HeapMemoryHighUsage", "instance": "iems-goeu-job-1-2"},
            "annotations": {"value": 0.93},
            "startsAt": "2024-05-01 10:00:00",
            "fingerprint": 12345
        }))
        .unwrap();

        assert!(alert.is_firing());
        assert_eq!(alert.instance(), Some("iems-goeu-job-1-2"));
        assert_eq!(alert.fingerprint(), None);
        assert_eq!(alert.annotations.unwrap()["value"], 0.93);
    }

    #[test]
    fn test_missing_labels() {
        let alert: Alert = serde_json::from_value(serde_json::json!({"status": "firing"})).unwrap();
        assert!(alert.name().is_none());
        assert!(alert.instance().is_none());
    }
}
