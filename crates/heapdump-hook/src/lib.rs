//! Heap dump webhook for Alertmanager.
//!
//! Receives Alertmanager webhook batches, picks out firing
//! `HeapMemoryHighUsage` alerts, and runs a heap dump script for the affected
//! container at most once per dedup window per instance.
//!
//! # Architecture
//!
//! - [`resolve`] derives the dedup key and the container name from an alert
//! - [`dedup::DedupEngine`] decides whether an instance was handled recently
//!   and records successful dumps
//! - [`store::StateStore`] persists the dedup record across restarts
//! - [`dispatch::DiagnosticAction`] runs the heap dump
//! - [`pipeline::WebhookPipeline`] ties them together per batch
//! - [`server`] exposes the pipeline over HTTP
//!
//! An instance is only marked handled after its heap dump succeeded, so a
//! failed dump is retried on the next firing Alertmanager sends.

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod resolve;
pub mod server;
pub mod store;
pub mod types;

pub use config::HookConfig;
pub use dedup::DedupEngine;
pub use dispatch::{ActionOutput, DiagnosticAction, ScriptDispatcher, SuccessCriterion};
pub use error::{ConfigError, DispatchError, PayloadError, StoreError};
pub use pipeline::{AlertOutcome, BatchSummary, WebhookPipeline};
pub use server::{build_router, run_server, ServerState};
pub use store::{DedupRecord, FileStore, StateStore};
pub use types::{Alert, AlertKey, AlertStatus, DiagnosticTarget};
