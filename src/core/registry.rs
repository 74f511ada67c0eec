//! In-memory job registry

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{JobDefinition, JobId};

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<JobId, JobDefinition>,
    /// Insertion order for listing
    order: Vec<JobId>,
}

/// Authoritative table of job definitions.
///
/// Every read hands out a snapshot; definitions are replaced whole, so a
/// reader never observes a half-applied update.
#[derive(Default)]
pub struct JobRegistry {
    state: RwLock<RegistryState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: JobDefinition) {
        let mut state = self.state.write().await;
        if state.jobs.insert(job.id, job.clone()).is_none() {
            state.order.push(job.id);
        }
    }

    pub async fn get(&self, id: &JobId) -> Option<JobDefinition> {
        self.state.read().await.jobs.get(id).cloned()
    }

    /// All jobs in creation order
    pub async fn list(&self) -> Vec<JobDefinition> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    /// Store `job` over an existing definition, keeping the stored
    /// `last_executed` (ticks may record it concurrently). Returns the stored value.
    pub async fn replace(&self, mut job: JobDefinition) -> Option<JobDefinition> {
        let mut state = self.state.write().await;
        let slot = state.jobs.get_mut(&job.id)?;
        job.last_executed = slot.last_executed;
        *slot = job.clone();
        Some(job)
    }

    pub async fn remove(&self, id: &JobId) -> Option<JobDefinition> {
        let mut state = self.state.write().await;
        let removed = state.jobs.remove(id)?;
        state.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Record a scheduled execution. No-op when the job was deleted meanwhile.
    pub async fn mark_executed(&self, id: &JobId, at: DateTime<Utc>) -> bool {
        match self.state.write().await.jobs.get_mut(id) {
            Some(job) => {
                job.last_executed = Some(at);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.jobs.is_empty()
    }

    pub async fn active_count(&self) -> usize {
        self.state
            .read()
            .await
            .jobs
            .values()
            .filter(|job| job.is_active)
            .count()
    }
}
