//! Time-windowed deduplication of handled alerts.
//!
//! Each key is either unseen or was last handled at some time `t`. A key is
//! suppressed while `now - t < window`; once the window has fully elapsed the
//! key is eligible again, and its timestamp is only replaced by the next
//! successful mark.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::store::{DedupRecord, StateStore};
use crate::types::AlertKey;

/// Whether `last` is still inside the window at `now`. The boundary itself is expired.
#[must_use]
pub fn within_window(last: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - last < window
}

/// Owns the dedup record and keeps the store in sync with it.
pub struct DedupEngine {
    record: Mutex<DedupRecord>,
    store: Arc<dyn StateStore>,
    window: Duration,
}

impl DedupEngine {
    /// Load the record from `store`. An unreadable store starts empty.
    pub async fn open(store: Arc<dyn StateStore>, window: Duration) -> Self {
        let record = match store.load().await {
            Ok(record) => {
                info!(entries = record.len(), "Loaded dedup record");
                record
            }
            Err(e) => {
                error!(error = %e, "Failed to load dedup record, starting empty");
                DedupRecord::new()
            }
        };

        Self {
            record: Mutex::new(record),
            store,
            window,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check whether `key` was handled inside the window.
    ///
    /// A missing key is never considered handled.
    pub async fn is_processed(&self, key: Option<&AlertKey>, now: DateTime<Utc>) -> bool {
        let Some(key) = key else {
            warn!("Alert has no instance, cannot deduplicate");
            return false;
        };

        let record = self.record.lock().await;
        match record.get(key) {
            Some(&last) if within_window(last, now, self.window) => {
                info!(%key, last_processed = %last, "Already handled within window");
                true
            }
            Some(&last) => {
                info!(%key, last_processed = %last, "Window expired, eligible again");
                false
            }
            None => {
                debug!(%key, "First occurrence");
                false
            }
        }
    }

    /// Record that `key` was handled at `now` and persist the whole record.
    ///
    /// Only call this after the heap dump succeeded. The in-memory record is
    /// updated even when saving fails; the save error is returned.
    pub async fn mark_processed(&self, key: &AlertKey, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut record = self.record.lock().await;
        record.insert(key.clone(), now);
        info!(%key, at = %now, "Marked alert as handled");

        self.store.save(&record).await
    }

    /// Copy of the current record.
    pub async fn snapshot(&self) -> DedupRecord {
        self.record.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store counting saves.
    #[derive(Default)]
    struct MemoryStore {
        saved: std::sync::Mutex<Option<DedupRecord>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn load(&self) -> Result<DedupRecord, StoreError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }

        async fn save(&self, record: &DedupRecord) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock().unwrap() = Some(record.clone());
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn load(&self) -> Result<DedupRecord, StoreError> {
            Err(StoreError::Other("disk unavailable".to_string()))
        }

        async fn save(&self, _record: &DedupRecord) -> Result<(), StoreError> {
            Err(StoreError::Other("disk unavailable".to_string()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn key() -> AlertKey {
        AlertKey::new("iems-goeu-job-59cb8dbcd4-c68tb")
    }

    #[test]
    fn test_window_boundary_is_expired() {
        let window = Duration::hours(1);
        assert!(within_window(t0(), t0(), window));
        assert!(within_window(t0(), t0() + Duration::minutes(59), window));
        assert!(within_window(
            t0(),
            t0() + window - Duration::nanoseconds(1),
            window
        ));
        assert!(!within_window(t0(), t0() + window, window));
        assert!(!within_window(t0(), t0() + Duration::hours(2), window));
    }

    #[tokio::test]
    async fn test_unseen_then_marked() {
        let store = Arc::new(MemoryStore::default());
        let engine = DedupEngine::open(store.clone(), Duration::hours(1)).await;

        assert!(!engine.is_processed(Some(&key()), t0()).await);

        engine.mark_processed(&key(), t0()).await.unwrap();

        assert!(engine.is_processed(Some(&key()), t0() + Duration::minutes(30)).await);
        assert!(!engine.is_processed(Some(&key()), t0() + Duration::hours(1)).await);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_key_never_processed() {
        let engine = DedupEngine::open(Arc::new(MemoryStore::default()), Duration::hours(1)).await;
        assert!(!engine.is_processed(None, t0()).await);
    }

    #[tokio::test]
    async fn test_remark_overwrites_timestamp() {
        let store = Arc::new(MemoryStore::default());
        let engine = DedupEngine::open(store.clone(), Duration::hours(1)).await;

        engine.mark_processed(&key(), t0()).await.unwrap();
        let later = t0() + Duration::hours(2);
        engine.mark_processed(&key(), later).await.unwrap();

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&key()], later);
        assert_eq!(store.load().await.unwrap()[&key()], later);
    }

    #[tokio::test]
    async fn test_loads_existing_record() {
        let store = Arc::new(MemoryStore::default());
        let mut record = DedupRecord::new();
        record.insert(key(), t0());
        store.save(&record).await.unwrap();

        let engine = DedupEngine::open(store, Duration::hours(1)).await;
        assert!(engine.is_processed(Some(&key()), t0() + Duration::minutes(10)).await);
    }

    #[tokio::test]
    async fn test_broken_store_degrades() {
        let engine = DedupEngine::open(Arc::new(BrokenStore), Duration::hours(1)).await;
        assert!(engine.snapshot().await.is_empty());

        let err = engine.mark_processed(&key(), t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));

        // In-memory state still suppresses the key
        assert!(engine.is_processed(Some(&key()), t0() + Duration::minutes(1)).await);
    }
}
