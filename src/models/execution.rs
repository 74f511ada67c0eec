//! Execution records produced by every dispatch attempt

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::job::JobId;

/// What caused a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of the external call. A record carries either the response or the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    Success { response: Value },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub job_id: JobId,
    /// Job name at dispatch time
    pub job_name: String,
    pub trigger: TriggerKind,
    pub execution_time_ms: u64,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

impl ExecutionRecord {
    pub fn status(&self) -> ExecutionStatus {
        match self.outcome {
            ExecutionOutcome::Success { .. } => ExecutionStatus::Success,
            ExecutionOutcome::Failed { .. } => ExecutionStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == ExecutionStatus::Success
    }

    pub fn response(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Success { response } => Some(response),
            ExecutionOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ExecutionOutcome::Failed { error } => Some(error),
            ExecutionOutcome::Success { .. } => None,
        }
    }
}
