//! Typed telemetry events and their document-store representation

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{JobDefinition, JobId, TriggerKind};

pub const SERVICE_NAME: &str = "dhantra-cron-service";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOperation {
    Create,
    Update,
    Delete,
    Toggle,
    Execute,
}

impl JobOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOperation::Create => "CREATE",
            JobOperation::Update => "UPDATE",
            JobOperation::Delete => "DELETE",
            JobOperation::Toggle => "TOGGLE",
            JobOperation::Execute => "EXECUTE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    JobCreated {
        job: JobDefinition,
    },
    JobManagement {
        operation: JobOperation,
        job_id: JobId,
        job_name: String,
        success: bool,
        details: Value,
    },
    ExecutionStarted {
        execution_id: Uuid,
        job: JobDefinition,
        trigger: TriggerKind,
    },
    ExecutionCompleted {
        execution_id: Uuid,
        job_id: JobId,
        success: bool,
        message: String,
        execution_time_ms: u64,
        response: Option<Value>,
    },
    CoreApiCall {
        execution_id: Uuid,
        endpoint: String,
        /// Request body with the credential removed
        request: Value,
        response_status: Option<u16>,
        response_time_ms: u64,
        success: bool,
        error: Option<String>,
    },
    ScheduleValidation {
        schedule: String,
        valid: bool,
        error: Option<String>,
    },
    Error {
        execution_id: Option<Uuid>,
        error_type: String,
        message: String,
        context: Value,
    },
}

fn completion_status(success: bool) -> &'static str {
    if success {
        "COMPLETED"
    } else {
        "FAILED"
    }
}

/// A document write: `collection/document_id` receives `body`
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryDocument {
    pub collection: &'static str,
    pub document_id: String,
    pub body: Value,
}

impl TelemetryEvent {
    pub fn collection(&self) -> &'static str {
        match self {
            TelemetryEvent::JobCreated { .. } => "cron_jobs",
            TelemetryEvent::JobManagement { .. } => "job_management",
            TelemetryEvent::ExecutionStarted { .. } | TelemetryEvent::ExecutionCompleted { .. } => {
                "cron_job_executions"
            }
            TelemetryEvent::CoreApiCall { .. } => "core_api_calls",
            TelemetryEvent::ScheduleValidation { .. } => "schedule_validations",
            TelemetryEvent::Error { .. } => "errors",
        }
    }

    pub fn log_type(&self) -> &'static str {
        match self {
            TelemetryEvent::JobCreated { .. } => "cron_job_created",
            TelemetryEvent::JobManagement { .. } => "job_management",
            TelemetryEvent::ExecutionStarted { .. } | TelemetryEvent::ExecutionCompleted { .. } => {
                "cron_job_execution"
            }
            TelemetryEvent::CoreApiCall { .. } => "core_api_call",
            TelemetryEvent::ScheduleValidation { .. } => "schedule_validation",
            TelemetryEvent::Error { .. } => "error",
        }
    }

    /// Build the document for this event.
    ///
    /// Execution start and completion share the execution id as document key,
    /// so the completion overwrites the start.
    pub fn into_document(self, at: DateTime<Utc>) -> TelemetryDocument {
        let collection = self.collection();
        let log_type = self.log_type();
        let millis = at.timestamp_millis();

        let (document_id, mut body) = match self {
            TelemetryEvent::JobCreated { job } => (
                job.id.to_string(),
                json!({
                    "jobId": job.id,
                    "jobName": job.name,
                    "schedule": job.schedule,
                    "tickers": job.tickers,
                    "strategy": job.strategy,
                    "confidenceThreshold": job.confidence_threshold,
                    "buyAmount": job.buy_amount,
                    "phoneNumbers": job.phone_numbers,
                    "status": "CREATED",
                }),
            ),
            TelemetryEvent::JobManagement {
                operation,
                job_id,
                job_name,
                success,
                details,
            } => (
                format!("{}_{}_{}", operation.as_str(), job_id, millis),
                json!({
                    "operation": operation,
                    "jobId": job_id,
                    "jobName": job_name,
                    "success": success,
                    "details": details,
                }),
            ),
            TelemetryEvent::ExecutionStarted {
                execution_id,
                job,
                trigger,
            } => (
                execution_id.to_string(),
                json!({
                    "jobId": job.id,
                    "executionId": execution_id,
                    "jobName": job.name,
                    "tickers": job.tickers,
                    "strategy": job.strategy,
                    "confidenceThreshold": job.confidence_threshold,
                    "buyAmount": job.buy_amount,
                    "phoneNumbers": job.phone_numbers,
                    "trigger": trigger,
                    "status": "STARTED",
                }),
            ),
            TelemetryEvent::ExecutionCompleted {
                execution_id,
                job_id,
                success,
                message,
                execution_time_ms,
                response,
            } => (
                execution_id.to_string(),
                json!({
                    "jobId": job_id,
                    "executionId": execution_id,
                    "status": completion_status(success),
                    "message": message,
                    "executionTime": execution_time_ms,
                    "responseData": response,
                }),
            ),
            TelemetryEvent::CoreApiCall {
                execution_id,
                endpoint,
                request,
                response_status,
                response_time_ms,
                success,
                error,
            } => (
                format!("{}_{}", execution_id, millis),
                json!({
                    "executionId": execution_id,
                    "endpoint": endpoint,
                    "requestPayload": request,
                    "responseStatus": response_status,
                    "responseTime": response_time_ms,
                    "success": success,
                    "errorMessage": error.unwrap_or_else(|| "N/A".to_string()),
                }),
            ),
            TelemetryEvent::ScheduleValidation {
                schedule,
                valid,
                error,
            } => (
                format!("schedule_{}", millis),
                json!({
                    "schedule": schedule,
                    "isValid": valid,
                    "errorMessage": error.unwrap_or_else(|| "N/A".to_string()),
                }),
            ),
            TelemetryEvent::Error {
                execution_id,
                error_type,
                message,
                context,
            } => {
                let prefix = execution_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "service".to_string());
                (
                    format!("{}_{}_{}", prefix, error_type, millis),
                    json!({
                        "executionId": execution_id,
                        "errorType": error_type,
                        "errorMessage": message,
                        "context": context,
                    }),
                )
            }
        };

        if let Value::Object(map) = &mut body {
            map.insert("timestamp".to_string(), json!(at));
            map.insert("service".to_string(), json!(SERVICE_NAME));
            map.insert("logType".to_string(), json!(log_type));
        }

        TelemetryDocument {
            collection,
            document_id,
            body,
        }
    }
}
