//! Dhantra Cron Service
//!
//! Holds trading cron jobs in memory, fires them on their schedules and
//! forwards each execution to the Dhantra core API.

use std::sync::Arc;

use dhantra_cron::config::{get_environment, ServiceConfig};
use dhantra_cron::core::http::{start_server, AppState};
use dhantra_cron::core::{ExecutionDispatcher, HistoryStore, Orchestrator};
use dhantra_cron::logging;
use dhantra_cron::metrics::Metrics;
use dhantra_cron::telemetry::{DocumentStoreSink, LogSink, Telemetry, TelemetrySink};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let config = ServiceConfig::from_env()?;
    let metrics = Arc::new(Metrics::new()?);

    info!("Starting Dhantra Cron Service");
    info!(environment = %get_environment(), "Environment");
    info!(core_api = %config.core_api_url, "Core API: {}", config.core_api_url);
    if config.api_key.is_none() {
        warn!("DHANTRA_API_KEY is not set, core API calls will be unauthenticated");
    }

    let sink: Arc<dyn TelemetrySink> = match &config.telemetry {
        Some(telemetry) => {
            info!(project = %telemetry.project_id, "Telemetry: document store");
            Arc::new(DocumentStoreSink::firestore(
                &telemetry.project_id,
                telemetry.api_key.clone(),
            )?)
        }
        None => {
            info!("Telemetry: log only");
            Arc::new(LogSink)
        }
    };
    let (telemetry, telemetry_task) = Telemetry::spawn(sink, Some(metrics.clone()));

    let history = Arc::new(HistoryStore::new(config.history_capacity));
    let dispatcher = ExecutionDispatcher::new(&config.core_api_url, config.api_key.clone(), history)
        .with_timeout(config.execution_timeout)
        .with_telemetry(telemetry.clone())
        .with_metrics(metrics.clone());

    let orchestrator = Orchestrator::new(dispatcher, telemetry, Some(metrics.clone()));
    let state = AppState {
        orchestrator: orchestrator.clone(),
        metrics,
    };

    if let Err(e) = start_server(config.port, state, &config.cors_origins, shutdown_signal()).await {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutting down cron service...");
    let report = orchestrator.shutdown(config.shutdown_grace).await;
    if report.abandoned > 0 {
        warn!(
            abandoned = report.abandoned,
            "{} executions were still running at shutdown",
            report.abandoned
        );
    }

    // The forwarder ends once every telemetry handle is gone
    drop(orchestrator);
    if tokio::time::timeout(config.shutdown_grace, telemetry_task)
        .await
        .is_err()
    {
        warn!("Telemetry forwarder did not drain before shutdown");
    }

    info!("Cron service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
