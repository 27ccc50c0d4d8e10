use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{NewRecord, PerformanceRecord};
use crate::store::{RecordQuery, RecordStore, Snapshot, StoreError, Subscription};

/// In-process record store with the same contract as the Postgres one.
pub struct MemoryStore {
    records: Mutex<Vec<PerformanceRecord>>,
    feed: watch::Sender<Snapshot>,
    offline: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: Mutex::new(Vec::new()),
            feed,
            offline: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
        }
    }

    /// Makes every following call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of committed write operations, single or batched.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<PerformanceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    /// Publishes under the records lock so snapshots reach subscribers in
    /// commit order.
    fn commit(&self, batch: Vec<PerformanceRecord>) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.extend(batch);
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.feed.send_replace(Arc::new(records.clone()));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn write(&self, record: &NewRecord) -> Result<Uuid, StoreError> {
        self.ensure_online()?;
        let id = Uuid::new_v4();
        self.commit(vec![record.clone().with_id(id)]);
        Ok(id)
    }

    async fn batch_write(&self, records: &[NewRecord]) -> Result<(), StoreError> {
        self.ensure_online()?;
        let batch = records
            .iter()
            .map(|record| record.clone().with_id(Uuid::new_v4()))
            .collect();
        self.commit(batch);
        Ok(())
    }

    async fn subscribe(&self, query: RecordQuery) -> Result<Subscription, StoreError> {
        self.ensure_online()?;
        Ok(Subscription::new(self.feed.subscribe(), query))
    }
}
