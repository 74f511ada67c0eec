//! Dispatches jobs to the Dhantra core execution API

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::core::history::HistoryStore;
use crate::error::DispatchError;
use crate::metrics::Metrics;
use crate::models::{ExecutionOutcome, ExecutionRecord, JobDefinition, TriggerKind};
use crate::telemetry::{Telemetry, TelemetryEvent};

pub const EXECUTE_PATH: &str = "/api/external-cron/execute";
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of the execute call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub tickers: Vec<String>,
    pub strategy: String,
    pub confidence_threshold: f64,
    pub buy_amount: f64,
    pub phone_numbers: Vec<String>,
    pub api_key: Option<String>,
}

impl ExecutionRequest {
    pub fn for_job(job: &JobDefinition, api_key: Option<String>) -> Self {
        Self {
            tickers: job.tickers.clone(),
            strategy: job.strategy.clone(),
            confidence_threshold: job.confidence_threshold,
            buy_amount: job.buy_amount,
            phone_numbers: job.phone_numbers.clone(),
            api_key,
        }
    }

    /// The request as JSON without the credential, for telemetry
    fn redacted(&self) -> Value {
        json!({
            "tickers": self.tickers,
            "strategy": self.strategy,
            "confidenceThreshold": self.confidence_threshold,
            "buyAmount": self.buy_amount,
            "phoneNumbers": self.phone_numbers,
        })
    }
}

pub struct ExecutionDispatcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    history: Arc<HistoryStore>,
    telemetry: Telemetry,
    metrics: Option<Arc<Metrics>>,
}

impl ExecutionDispatcher {
    pub fn new(base_url: &str, api_key: Option<String>, history: Arc<HistoryStore>) -> Self {
        Self::with_client(base_url, api_key, reqwest::Client::new(), history)
    }

    pub fn with_client(
        base_url: &str,
        api_key: Option<String>,
        client: reqwest::Client,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), EXECUTE_PATH),
            api_key,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            history,
            telemetry: Telemetry::disabled(),
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Run one execution of `job`.
    ///
    /// Always yields a record: failures of the external call (error status,
    /// timeout, network) become a FAILED record. The record is appended to the
    /// history before it is returned.
    pub async fn execute(&self, job: &JobDefinition, trigger: TriggerKind) -> ExecutionRecord {
        let execution_id = Uuid::new_v4();
        let request = ExecutionRequest::for_job(job, self.api_key.clone());

        info!(
            job_id = %job.id,
            execution_id = %execution_id,
            trigger = trigger.as_str(),
            "Executing cron job: {} ({})",
            job.name,
            execution_id
        );
        self.telemetry.publish(TelemetryEvent::ExecutionStarted {
            execution_id,
            job: job.clone(),
            trigger,
        });

        let start = Instant::now();
        let result = self.call(&request).await;
        let elapsed = start.elapsed();
        let execution_time_ms = elapsed.as_millis() as u64;

        self.telemetry.publish(TelemetryEvent::CoreApiCall {
            execution_id,
            endpoint: self.endpoint.clone(),
            request: request.redacted(),
            response_status: match &result {
                Ok((status, _)) => Some(*status),
                Err(e) => e.status_code(),
            },
            response_time_ms: execution_time_ms,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        let outcome = match result {
            Ok((_, response)) => {
                info!(
                    job_id = %job.id,
                    execution_id = %execution_id,
                    duration_ms = execution_time_ms,
                    "Cron job {} executed successfully in {}ms",
                    job.name,
                    execution_time_ms
                );
                ExecutionOutcome::Success { response }
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    execution_id = %execution_id,
                    duration_ms = execution_time_ms,
                    error = %e,
                    "Cron job {} failed: {}",
                    job.name,
                    e
                );
                self.telemetry.publish(TelemetryEvent::Error {
                    execution_id: Some(execution_id),
                    error_type: "DISPATCH_FAILED".to_string(),
                    message: e.to_string(),
                    context: json!({
                        "jobId": job.id,
                        "jobName": job.name,
                        "endpoint": self.endpoint,
                    }),
                });
                ExecutionOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let record = ExecutionRecord {
            execution_id,
            job_id: job.id,
            job_name: job.name.clone(),
            trigger,
            execution_time_ms,
            timestamp: Utc::now(),
            outcome,
        };

        self.history.append(record.clone()).await;

        if let Some(ref metrics) = self.metrics {
            let status = record.status().to_string();
            metrics
                .executions_total
                .with_label_values(&[status.as_str(), trigger.as_str()])
                .inc();
            metrics
                .execution_duration_seconds
                .observe(elapsed.as_secs_f64());
        }

        self.telemetry.publish(TelemetryEvent::ExecutionCompleted {
            execution_id,
            job_id: job.id,
            success: record.is_success(),
            message: match record.error() {
                Some(error) => error.to_string(),
                None => "Execution completed".to_string(),
            },
            execution_time_ms,
            response: record.response().cloned(),
        });

        record
    }

    /// POST the request, bounded by the dispatch timeout.
    async fn call(&self, request: &ExecutionRequest) -> Result<(u16, Value), DispatchError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;

            if !status.is_success() {
                return Err(DispatchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok((status.as_u16(), parse_body(body)))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))?
    }
}

/// Keep the response verbatim: JSON when it parses, the raw text otherwise.
fn parse_body(body: String) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}
