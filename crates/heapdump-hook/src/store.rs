//! Persistence of the dedup record.
//!
//! The record is a JSON object mapping alert key to the UTC time the key was
//! last handled:
//!
//! ```json
//! {"iems-goeu-job-59cb8dbcd4-c68tb": "2024-05-01T10:00:00.123456Z"}
//! ```
//!
//! Files written by older deployments carry naive timestamps without an
//! offset; those are read as UTC.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::types::AlertKey;

/// Last-handled time per alert key.
pub type DedupRecord = BTreeMap<AlertKey, DateTime<Utc>>;

/// Durable storage for the dedup record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the stored record. Missing storage is an empty record.
    async fn load(&self) -> Result<DedupRecord, StoreError>;

    /// Replace the stored record.
    async fn save(&self, record: &DedupRecord) -> Result<(), StoreError>;
}

/// JSON file store.
///
/// Writes go to a sibling `.tmp` file that is renamed over the target, under a
/// lock so concurrent saves never interleave.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self) -> Result<DedupRecord, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet");
                return Ok(DedupRecord::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        decode_record(&content)
    }

    async fn save(&self, record: &DedupRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let content = encode_record(record)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, content).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        debug!(path = %self.path.display(), entries = record.len(), "Saved dedup record");
        Ok(())
    }
}

/// Serialize a record to its JSON file form.
pub fn encode_record(record: &DedupRecord) -> Result<String, StoreError> {
    let raw: BTreeMap<&str, String> = record
        .iter()
        .map(|(key, at)| (key.as_str(), at.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .collect();
    Ok(serde_json::to_string_pretty(&raw)?)
}

/// Parse a record from its JSON file form.
pub fn decode_record(content: &str) -> Result<DedupRecord, StoreError> {
    let raw: BTreeMap<String, String> = serde_json::from_str(content)?;
    raw.into_iter()
        .map(|(key, value)| match parse_timestamp(&value) {
            Some(at) => Ok((AlertKey::new(key), at)),
            None => Err(StoreError::InvalidTimestamp { key, value }),
        })
        .collect()
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
