//! Error taxonomy for job management, dispatch and telemetry

use std::time::Duration;

use thiserror::Error;

use crate::models::JobId;

/// Errors surfaced to callers of the job management operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Missing or invalid fields, including a bad schedule. Job state is unchanged.
    #[error("{0}")]
    Validation(String),

    #[error("Cron job not found: {0}")]
    NotFound(JobId),

    /// The orchestrator is draining and refuses new work.
    #[error("Cron service is shutting down")]
    ShuttingDown,

    /// Unexpected fault; details are logged, callers get a generic message.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ScheduleError> for JobError {
    fn from(err: ScheduleError) -> Self {
        JobError::Validation(format!("Invalid cron schedule format: {}", err))
    }
}

/// Cron expression parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), found {0}")]
    FieldCount(usize),

    #[error("{field}: empty list item")]
    EmptyItem { field: &'static str },

    #[error("{field}: '{token}' is not a number or name")]
    InvalidToken { field: &'static str, token: String },

    #[error("{field}: {value} is outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field}: range start {start} is greater than end {end}")]
    InvertedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },

    #[error("{field}: step must be a positive number, got '{step}'")]
    InvalidStep { field: &'static str, step: String },

    #[error("expression could not be compiled: {0}")]
    Compile(String),
}

/// Failures calling the external execution API. Captured into a FAILED
/// execution record by the dispatcher, never returned to callers.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Transport(String),

    #[error("Request failed with status code {status}")]
    Status { status: u16, body: String },
}

impl DispatchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DispatchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Telemetry write failures. Always logged and swallowed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry transport error: {0}")]
    Transport(String),

    #[error("telemetry write rejected with status {status}")]
    Rejected { status: u16 },

    #[error("telemetry write timed out")]
    Timeout,
}

/// Invalid service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
