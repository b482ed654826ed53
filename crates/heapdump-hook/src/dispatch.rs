//! Heap dump action dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info};

use crate::error::DispatchError;
use crate::types::DiagnosticTarget;

/// How a finished action run is judged successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessCriterion {
    /// Success when nothing was written to stderr, whatever the exit status
    Stderr,
    /// Success when the exit status is zero, whatever was written to stderr
    ExitCode,
    /// Success when the exit status is zero and stderr is empty
    #[default]
    Strict,
}

/// Captured result of a finished action run.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ActionOutput {
    /// Apply a success criterion to this output.
    pub fn check(self, criterion: SuccessCriterion) -> Result<Self, DispatchError> {
        let exited_ok = self.exit_code == Some(0);
        let stderr_clean = self.stderr.is_empty();

        match criterion {
            SuccessCriterion::Stderr if !stderr_clean => Err(DispatchError::Stderr {
                stderr: self.stderr,
            }),
            SuccessCriterion::ExitCode | SuccessCriterion::Strict if !exited_ok => {
                Err(DispatchError::ExitStatus {
                    status: self
                        .exit_code
                        .map_or_else(|| "signal".to_string(), |c| format!("exit code {c}")),
                    stderr: self.stderr,
                })
            }
            SuccessCriterion::Strict if !stderr_clean => Err(DispatchError::Stderr {
                stderr: self.stderr,
            }),
            _ => Ok(self),
        }
    }
}

/// The side effect triggered for a heap memory alert.
#[async_trait]
pub trait DiagnosticAction: Send + Sync {
    /// Run the action for one target.
    async fn invoke(
        &self,
        target: &DiagnosticTarget,
        instance: &str,
        namespace: &str,
    ) -> Result<ActionOutput, DispatchError>;
}

/// Runs the heap dump script as `<interpreter> <script> <instance> <namespace> <target>`.
pub struct ScriptDispatcher {
    interpreter: String,
    script: PathBuf,
    criterion: SuccessCriterion,
    timeout: Option<Duration>,
}

impl ScriptDispatcher {
    pub fn new(
        interpreter: impl Into<String>,
        script: impl Into<PathBuf>,
        criterion: SuccessCriterion,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            criterion,
            timeout: None,
        }
    }

    /// Kill the script if it runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DiagnosticAction for ScriptDispatcher {
    async fn invoke(
        &self,
        target: &DiagnosticTarget,
        instance: &str,
        namespace: &str,
    ) -> Result<ActionOutput, DispatchError> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script)
            .args([instance, namespace, target.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| DispatchError::Timeout {
                    secs: limit.as_secs(),
                })?,
            None => run.await,
        }
        .map_err(|source| DispatchError::Spawn {
            program: self.interpreter.clone(),
            source,
        })?;

        let output = ActionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if !output.stdout.trim().is_empty() {
            info!(%target, stdout = %output.stdout.trim_end(), "Heap dump output");
        }
        if !output.stderr.is_empty() {
            error!(%target, stderr = %output.stderr.trim_end(), "Heap dump reported errors");
        }

        output.check(self.criterion)
    }
}
