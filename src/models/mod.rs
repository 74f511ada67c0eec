//! Shared data models for jobs and their executions.

pub mod execution;
pub mod job;

pub use execution::{ExecutionOutcome, ExecutionRecord, ExecutionStatus, TriggerKind};
pub use job::{
    JobDefinition, JobId, JobSummary, JobUpdate, NewJob, DEFAULT_BUY_AMOUNT,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_STRATEGY,
};
