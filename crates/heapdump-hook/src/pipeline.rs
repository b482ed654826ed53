//! Webhook batch processing.
//!
//! For every firing heap memory alert in a batch:
//! alert key -> dedup check -> target resolution -> heap dump -> mark handled.
//! Each alert is processed on its own; one bad alert never fails the batch.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::HookConfig;
use crate::dedup::DedupEngine;
use crate::dispatch::{DiagnosticAction, ScriptDispatcher};
use crate::error::PayloadError;
use crate::resolve::{alert_key, TargetConvention};
use crate::store::FileStore;
use crate::types::Alert;

/// What happened to one alert of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlertOutcome {
    /// Element could not be decoded as an alert
    Invalid { reason: String },
    /// Status was not `firing`
    NotFiring,
    /// A different alert than the monitored one
    Ignored { alertname: Option<String> },
    /// Same instance was handled inside the dedup window
    AlreadyProcessed { key: String },
    /// Instance does not follow the naming convention
    UnresolvableTarget { instance: Option<String> },
    /// Heap dump ran but did not succeed
    ActionFailed { target: String, reason: String },
    /// Heap dump succeeded; `persisted` is false when the dedup record could not be saved
    Dispatched { target: String, persisted: bool },
}

/// Result of processing one webhook batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub alerts_received: usize,
    pub dumps_triggered: usize,
    pub outcomes: Vec<AlertOutcome>,
}

impl BatchSummary {
    fn push(&mut self, outcome: AlertOutcome) {
        if matches!(outcome, AlertOutcome::Dispatched { .. }) {
            self.dumps_triggered += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Extract the list of alert objects from a webhook body.
///
/// Accepts a bare JSON array or an Alertmanager object with an `alerts` array.
pub fn normalize_payload(payload: Value) -> Result<Vec<Value>, PayloadError> {
    match payload {
        Value::Array(alerts) => Ok(alerts),
        Value::Object(mut body) => match body.remove("alerts") {
            Some(Value::Array(alerts)) => Ok(alerts),
            Some(other) => Err(PayloadError::Malformed(format!(
                "`alerts` must be a list, got {}",
                json_type(&other)
            ))),
            None => Err(PayloadError::Malformed(
                "object without an `alerts` field".to_string(),
            )),
        },
        other => Err(PayloadError::Malformed(json_type(&other).to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Coordinates dedup, target resolution and heap dump dispatch.
pub struct WebhookPipeline {
    alert_name: String,
    namespace: String,
    targets: TargetConvention,
    dedup: DedupEngine,
    action: Arc<dyn DiagnosticAction>,
}

impl WebhookPipeline {
    pub fn new(config: &HookConfig, dedup: DedupEngine, action: Arc<dyn DiagnosticAction>) -> Self {
        Self {
            alert_name: config.alert_name.clone(),
            namespace: config.namespace.clone(),
            targets: config.target.clone(),
            dedup,
            action,
        }
    }

    /// Build the production pipeline: file-backed dedup record and script dispatcher.
    pub async fn from_config(config: &HookConfig) -> Self {
        let store = Arc::new(FileStore::new(&config.state_file));
        let dedup = DedupEngine::open(store, config.dedup_window()).await;
        let action = ScriptDispatcher::new(
            &config.interpreter,
            &config.script_path,
            config.success_criterion,
        )
        .with_timeout(config.action_timeout());

        Self::new(config, dedup, Arc::new(action))
    }

    #[must_use]
    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    /// Process a webhook body.
    pub async fn handle(&self, payload: Value) -> Result<BatchSummary, PayloadError> {
        let alerts = normalize_payload(payload).inspect_err(|e| {
            warn!(error = %e, "Unknown alert payload format");
        })?;

        let mut summary = BatchSummary {
            alerts_received: alerts.len(),
            ..Default::default()
        };

        for (index, raw) in alerts.into_iter().enumerate() {
            let outcome = self
                .process_alert(raw)
                .instrument(info_span!("alert", index))
                .await;
            summary.push(outcome);
        }

        info!(
            alerts = summary.alerts_received,
            dumps = summary.dumps_triggered,
            "Processed alert batch"
        );
        Ok(summary)
    }

    async fn process_alert(&self, raw: Value) -> AlertOutcome {
        let alert: Alert = match serde_json::from_value(raw) {
            Ok(alert) => alert,
            Err(e) => {
                error!(error = %e, "Failed to decode alert");
                return AlertOutcome::Invalid {
                    reason: e.to_string(),
                };
            }
        };

        if !alert.is_firing() {
            info!(instance = ?alert.instance(), "Skipping non-firing alert");
            return AlertOutcome::NotFiring;
        }

        if alert.name() != Some(self.alert_name.as_str()) {
            return AlertOutcome::Ignored {
                alertname: alert.name().map(ToString::to_string),
            };
        }

        let instance = alert.instance();
        info!(instance = ?instance, "Heap memory alert received");

        let key = alert_key(&alert);
        if self.dedup.is_processed(key.as_ref(), Utc::now()).await {
            // is_processed only returns true for a present key
            let key = key.map(|k| k.to_string()).unwrap_or_default();
            info!(%key, "Skipping already handled alert");
            return AlertOutcome::AlreadyProcessed { key };
        }

        let Some((instance, target)) =
            instance.and_then(|i| self.targets.resolve(i).map(|t| (i, t)))
        else {
            warn!(instance = ?instance, "Cannot derive container name from instance, skipping");
            return AlertOutcome::UnresolvableTarget {
                instance: instance.map(ToString::to_string),
            };
        };

        info!(
            instance,
            namespace = %self.namespace,
            %target,
            "Triggering heap dump"
        );

        if let Err(e) = self.action.invoke(&target, instance, &self.namespace).await {
            error!(%target, error = %e, "Heap dump failed, alert stays eligible");
            return AlertOutcome::ActionFailed {
                target: target.to_string(),
                reason: e.to_string(),
            };
        }

        let persisted = match &key {
            Some(key) => match self.dedup.mark_processed(key, Utc::now()).await {
                Ok(()) => true,
                Err(e) => {
                    error!(%key, error = %e, "Failed to persist dedup record");
                    false
                }
            },
            None => false,
        };

        info!(%target, "Heap dump completed");
        AlertOutcome::Dispatched {
            target: target.to_string(),
            persisted,
        }
    }
}
