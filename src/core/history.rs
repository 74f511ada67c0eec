//! Append-only execution history

use std::collections::VecDeque;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{ExecutionRecord, JobId};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Time-ordered log of execution records.
///
/// With a capacity set, the oldest records are evicted once the log is full.
/// Records are never removed otherwise, including when their job is deleted.
pub struct HistoryStore {
    records: RwLock<VecDeque<ExecutionRecord>>,
    capacity: Option<usize>,
}

impl HistoryStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub async fn append(&self, record: ExecutionRecord) {
        let mut records = self.records.write().await;
        if let Some(capacity) = self.capacity {
            while records.len() >= capacity {
                if let Some(evicted) = records.pop_front() {
                    debug!(
                        execution_id = %evicted.execution_id,
                        job_id = %evicted.job_id,
                        "HistoryStore: evicted oldest execution record"
                    );
                }
            }
        }
        records.push_back(record);
    }

    /// Records newest first, optionally filtered by job, truncated to `limit`.
    pub async fn query(&self, job_id: Option<JobId>, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        // Reverse append order first so records with equal timestamps stay newest first
        let mut matching: Vec<ExecutionRecord> = records
            .iter()
            .rev()
            .filter(|record| job_id.map_or(true, |id| record.job_id == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        matching
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::unbounded()
    }
}
