use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{NewRecord, PerformanceRecord};

pub type Snapshot = Arc<Vec<PerformanceRecord>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record store rejected the write: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StoreError::Rejected(db.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Which records a subscription follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub district_id: Option<i32>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn district(district_id: i32) -> Self {
        Self {
            district_id: Some(district_id),
        }
    }

    pub fn matches(&self, record: &PerformanceRecord) -> bool {
        self.district_id.map_or(true, |id| record.district_id == id)
    }
}

/// Persistence collaborator for performance records.
///
/// `batch_write` must commit every document or none of them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn write(&self, record: &NewRecord) -> Result<Uuid, StoreError>;

    async fn batch_write(&self, records: &[NewRecord]) -> Result<(), StoreError>;

    async fn subscribe(&self, query: RecordQuery) -> Result<Subscription, StoreError>;
}

/// A live view over the store. Each change produces a fresh snapshot; the
/// feed stops when the subscription is dropped.
pub struct Subscription {
    receiver: watch::Receiver<Snapshot>,
    query: RecordQuery,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(receiver: watch::Receiver<Snapshot>, query: RecordQuery) -> Self {
        Self {
            receiver,
            query,
            task: None,
        }
    }

    /// Ties a background feeder task to the subscription's lifetime.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn current(&mut self) -> Vec<PerformanceRecord> {
        let snapshot = self.receiver.borrow_and_update().clone();
        self.filter(&snapshot)
    }

    /// Waits for the next snapshot. Returns `None` once the store side has
    /// gone away.
    pub async fn next(&mut self) -> Option<Vec<PerformanceRecord>> {
        self.receiver.changed().await.ok()?;
        Some(self.current())
    }

    fn filter(&self, snapshot: &[PerformanceRecord]) -> Vec<PerformanceRecord> {
        snapshot
            .iter()
            .filter(|record| self.query.matches(record))
            .cloned()
            .collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
