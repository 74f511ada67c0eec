//! Telemetry transports

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, info};

use super::events::TelemetryDocument;
use crate::error::TelemetryError;

/// Per-attempt timeout for document writes
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn write(&self, document: &TelemetryDocument) -> Result<(), TelemetryError>;
}

/// Writes telemetry documents to the service log
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn write(&self, document: &TelemetryDocument) -> Result<(), TelemetryError> {
        info!(
            target: "telemetry",
            collection = document.collection,
            document_id = %document.document_id,
            body = %document.body,
            "telemetry event"
        );
        Ok(())
    }
}

impl TelemetryError {
    fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Transport(_) | TelemetryError::Timeout => true,
            TelemetryError::Rejected { status } => *status >= 500 || *status == 429,
        }
    }
}

/// PATCHes each document to `{base_url}/{collection}/{document_id}`
pub struct DocumentStoreSink {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DocumentStoreSink {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(WRITE_TIMEOUT).build()?;
        Ok(Self::with_client(base_url, api_key, client))
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Sink for the default database of a Firestore project
    pub fn firestore(project_id: &str, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        Self::new(
            format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_BASE_URL, project_id
            ),
            api_key,
        )
    }

    pub fn document_url(&self, document: &TelemetryDocument) -> String {
        format!(
            "{}/{}/{}",
            self.base_url, document.collection, document.document_id
        )
    }

    async fn send_once(&self, document: &TelemetryDocument) -> Result<(), TelemetryError> {
        let mut request = self
            .client
            .patch(self.document_url(document))
            .json(&document.body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TelemetryError::Timeout
            } else {
                TelemetryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl TelemetrySink for DocumentStoreSink {
    async fn write(&self, document: &TelemetryDocument) -> Result<(), TelemetryError> {
        (|| self.send_once(document))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(100))
                    .with_max_times(2),
            )
            .when(|e: &TelemetryError| e.is_retryable())
            .notify(|err: &TelemetryError, delay: Duration| {
                debug!(
                    collection = document.collection,
                    document_id = %document.document_id,
                    error = %err,
                    "telemetry write failed, retrying in {:?}",
                    delay
                );
            })
            .await?;

        debug!(
            collection = document.collection,
            document_id = %document.document_id,
            "telemetry document written"
        );
        Ok(())
    }
}
