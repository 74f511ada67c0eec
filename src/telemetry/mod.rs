//! Best-effort telemetry
//!
//! Business logic publishes typed [`TelemetryEvent`]s; a forwarder task owns
//! the transport. Publishing never blocks and never fails, and transport
//! failures stay inside the forwarder.

pub mod events;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::Metrics;

pub use events::{JobOperation, TelemetryDocument, TelemetryEvent, SERVICE_NAME};
pub use sink::{DocumentStoreSink, LogSink, TelemetrySink};

/// Ceiling for one event, retries included
pub const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle for publishing telemetry events
#[derive(Clone, Default)]
pub struct Telemetry {
    sender: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl Telemetry {
    /// A publisher that drops every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Start the forwarder task delivering events to `sink` in publish order.
    ///
    /// The task ends once every `Telemetry` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(
        sink: Arc<dyn TelemetrySink>,
        metrics: Option<Arc<Metrics>>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TelemetryEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let document = event.into_document(Utc::now());
                let outcome = tokio::time::timeout(TELEMETRY_TIMEOUT, sink.write(&document)).await;

                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some("timed out".to_string()),
                };
                if let Some(error) = failure {
                    warn!(
                        collection = document.collection,
                        document_id = %document.document_id,
                        error = %error,
                        "Telemetry: dropped event for {}/{}: {}",
                        document.collection,
                        document.document_id,
                        error
                    );
                    if let Some(ref metrics) = metrics {
                        metrics.telemetry_failures_total.inc();
                    }
                }
            }
            debug!("Telemetry: forwarder stopped");
        });

        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    pub fn publish(&self, event: TelemetryEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                debug!("Telemetry: forwarder gone, event dropped");
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}
