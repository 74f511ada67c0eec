//! Job orchestrator: registry, triggers and dispatch wired together

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::core::dispatcher::ExecutionDispatcher;
use crate::core::registry::JobRegistry;
use crate::core::schedule::CronSchedule;
use crate::core::trigger::{FireReceiver, TriggerEngine};
use crate::error::JobError;
use crate::metrics::Metrics;
use crate::models::{
    ExecutionRecord, JobDefinition, JobId, JobSummary, JobUpdate, NewJob, TriggerKind,
};
use crate::telemetry::{JobOperation, Telemetry, TelemetryEvent};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub active_job_count: usize,
    pub total_jobs: usize,
    pub armed_triggers: usize,
    pub total_executions: usize,
    /// Seconds since the service started
    pub uptime: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Dispatches still running when the grace period ran out
    pub abandoned: usize,
}

/// Owns the job registry, the trigger engine and the dispatcher.
///
/// Job mutations (create, update, delete, toggle) run one at a time behind
/// `mutations`, so the registry and the armed timers always change together.
/// Dispatches run on their own tasks and may overlap, even for the same job.
pub struct Orchestrator {
    registry: JobRegistry,
    triggers: TriggerEngine,
    dispatcher: ExecutionDispatcher,
    telemetry: Telemetry,
    metrics: Option<Arc<Metrics>>,
    mutations: Mutex<()>,
    in_flight: TaskTracker,
    fire_loop: JoinHandle<()>,
    draining: AtomicBool,
    started_at: Instant,
}

impl Orchestrator {
    /// Build the orchestrator and start consuming trigger ticks.
    pub fn new(
        dispatcher: ExecutionDispatcher,
        telemetry: Telemetry,
        metrics: Option<Arc<Metrics>>,
    ) -> Arc<Self> {
        let (triggers, fires) = TriggerEngine::new();
        Arc::new_cyclic(|weak: &Weak<Self>| Self {
            registry: JobRegistry::new(),
            triggers,
            dispatcher,
            telemetry,
            metrics,
            mutations: Mutex::new(()),
            in_flight: TaskTracker::new(),
            fire_loop: tokio::spawn(fire_loop(weak.clone(), fires)),
            draining: AtomicBool::new(false),
            started_at: Instant::now(),
        })
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn triggers(&self) -> &TriggerEngine {
        &self.triggers
    }

    pub fn dispatcher(&self) -> &ExecutionDispatcher {
        &self.dispatcher
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub async fn create(&self, request: NewJob) -> Result<JobDefinition, JobError> {
        let _guard = self.mutations.lock().await;
        self.ensure_accepting()?;

        if let Some(expr) = &request.schedule {
            self.report_schedule(expr);
        }
        let job = request.into_definition(Utc::now())?;

        self.registry.insert(job.clone()).await;
        self.triggers.arm(job.id, &job.schedule).await;
        self.refresh_gauges().await;

        info!(
            job_id = %job.id,
            schedule = %job.schedule,
            "Created cron job: {} with schedule: {}",
            job.name,
            job.schedule
        );
        self.telemetry.publish(TelemetryEvent::JobCreated { job: job.clone() });
        self.publish_management(JobOperation::Create, &job, true, json!({}));
        Ok(job)
    }

    /// Jobs in creation order
    pub async fn list(&self) -> Vec<JobSummary> {
        self.registry
            .list()
            .await
            .iter()
            .map(JobSummary::from)
            .collect()
    }

    pub async fn get(&self, id: &JobId) -> Result<JobDefinition, JobError> {
        self.registry.get(id).await.ok_or(JobError::NotFound(*id))
    }

    /// Merge `update` into the job. A schedule change re-arms its timer; a
    /// rejected update leaves both the definition and the timer untouched.
    pub async fn update(&self, id: &JobId, update: JobUpdate) -> Result<JobDefinition, JobError> {
        let _guard = self.mutations.lock().await;
        self.ensure_accepting()?;

        let current = self.get(id).await?;
        if let Some(expr) = &update.schedule {
            if expr.trim() != current.schedule.expression() {
                self.report_schedule(expr);
            }
        }

        let candidate = match update.apply(&current, Utc::now()) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(job_id = %id, error = %e, "Rejected update of cron job {}: {}", current.name, e);
                self.publish_management(
                    JobOperation::Update,
                    &current,
                    false,
                    json!({ "error": e.to_string() }),
                );
                return Err(e);
            }
        };

        let stored = self
            .registry
            .replace(candidate)
            .await
            .ok_or(JobError::NotFound(*id))?;
        self.sync_trigger(&current, &stored).await;
        self.refresh_gauges().await;

        info!(job_id = %id, "Updated cron job: {}", stored.name);
        self.publish_management(
            JobOperation::Update,
            &stored,
            true,
            json!({ "schedule": stored.schedule, "isActive": stored.is_active }),
        );
        Ok(stored)
    }

    /// Remove the job and its timer. Execution history is kept.
    pub async fn delete(&self, id: &JobId) -> Result<JobDefinition, JobError> {
        let _guard = self.mutations.lock().await;

        let removed = self
            .registry
            .remove(id)
            .await
            .ok_or(JobError::NotFound(*id))?;
        self.triggers.disarm(id).await;
        self.refresh_gauges().await;

        info!(job_id = %id, "Deleted cron job: {}", removed.name);
        self.publish_management(JobOperation::Delete, &removed, true, json!({}));
        Ok(removed)
    }

    /// Flip `is_active`, disarming or re-arming the timer to match.
    pub async fn toggle(&self, id: &JobId) -> Result<JobDefinition, JobError> {
        let _guard = self.mutations.lock().await;
        self.ensure_accepting()?;

        let current = self.get(id).await?;
        let mut candidate = current.clone();
        candidate.is_active = !current.is_active;
        candidate.updated_at = Some(Utc::now());

        let stored = self
            .registry
            .replace(candidate)
            .await
            .ok_or(JobError::NotFound(*id))?;
        self.sync_trigger(&current, &stored).await;
        self.refresh_gauges().await;

        info!(
            job_id = %id,
            is_active = stored.is_active,
            "Toggled cron job {} to {}",
            stored.name,
            if stored.is_active { "active" } else { "inactive" }
        );
        self.publish_management(
            JobOperation::Toggle,
            &stored,
            true,
            json!({ "isActive": stored.is_active }),
        );
        Ok(stored)
    }

    /// Dispatch the job now and wait for the result.
    ///
    /// Manual runs ignore `is_active` and do not touch `last_executed`.
    pub async fn execute(self: &Arc<Self>, id: &JobId) -> Result<ExecutionRecord, JobError> {
        self.ensure_accepting()?;
        let job = self.get(id).await?;

        info!(job_id = %id, "Manually executing cron job: {}", job.name);
        let this = Arc::clone(self);
        let task_job = job.clone();
        let record = self
            .in_flight
            .spawn(async move {
                this.dispatcher
                    .execute(&task_job, TriggerKind::Manual)
                    .await
            })
            .await
            .map_err(|e| JobError::Internal(format!("manual execution task failed: {}", e)))?;

        self.publish_management(
            JobOperation::Execute,
            &job,
            record.is_success(),
            json!({ "executionId": record.execution_id, "status": record.status() }),
        );
        Ok(record)
    }

    /// Handle one timer tick for `job_id`.
    ///
    /// Re-reads the live definition, so ticks for deleted or deactivated jobs
    /// are dropped. Returns the record when a dispatch happened.
    pub async fn run_scheduled(&self, job_id: JobId) -> Option<ExecutionRecord> {
        let Some(job) = self.registry.get(&job_id).await else {
            debug!(job_id = %job_id, "Tick for deleted cron job {}, skipping", job_id);
            return None;
        };
        if !job.is_active {
            debug!(job_id = %job_id, "Tick for inactive cron job {}, skipping", job.name);
            return None;
        }

        let fired_at = Utc::now();
        let record = self.dispatcher.execute(&job, TriggerKind::Scheduled).await;
        self.registry.mark_executed(&job_id, fired_at).await;
        Some(record)
    }

    /// Execution records newest first
    pub async fn history(&self, job_id: Option<JobId>, limit: usize) -> Vec<ExecutionRecord> {
        self.dispatcher.history().query(job_id, limit).await
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: if self.is_draining() { "draining" } else { "healthy" },
            active_job_count: self.registry.active_count().await,
            total_jobs: self.registry.len().await,
            armed_triggers: self.triggers.armed_count().await,
            total_executions: self.dispatcher.history().len().await,
            uptime: self.started_at.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// Stop all timers, refuse new work and wait up to `grace` for running
    /// dispatches. Dispatches still running afterwards are abandoned and
    /// their records are lost.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            return ShutdownReport {
                abandoned: self.in_flight.len(),
            };
        }

        {
            let _guard = self.mutations.lock().await;
            self.triggers.shutdown().await;
        }
        self.fire_loop.abort();
        self.in_flight.close();

        let pending = self.in_flight.len();
        info!(
            in_flight = pending,
            grace_secs = grace.as_secs(),
            "Orchestrator: draining {} in-flight executions",
            pending
        );

        match tokio::time::timeout(grace, self.in_flight.wait()).await {
            Ok(()) => {
                info!("Orchestrator: all executions finished");
                ShutdownReport { abandoned: 0 }
            }
            Err(_) => {
                let abandoned = self.in_flight.len();
                warn!(
                    abandoned = abandoned,
                    "Orchestrator: grace period elapsed, abandoning {} executions",
                    abandoned
                );
                ShutdownReport { abandoned }
            }
        }
    }

    fn ensure_accepting(&self) -> Result<(), JobError> {
        if self.is_draining() {
            Err(JobError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Keep exactly one timer per active job after a definition change.
    async fn sync_trigger(&self, before: &JobDefinition, after: &JobDefinition) {
        match (before.is_active, after.is_active) {
            (_, true) if !before.is_active || before.schedule != after.schedule => {
                self.triggers.arm(after.id, &after.schedule).await;
            }
            (true, false) => {
                self.triggers.disarm(&after.id).await;
            }
            _ => {}
        }
    }

    fn report_schedule(&self, expr: &str) {
        let error = CronSchedule::parse(expr).err();
        self.telemetry.publish(TelemetryEvent::ScheduleValidation {
            schedule: expr.to_string(),
            valid: error.is_none(),
            error: error.map(|e| e.to_string()),
        });
    }

    fn publish_management(
        &self,
        operation: JobOperation,
        job: &JobDefinition,
        success: bool,
        details: serde_json::Value,
    ) {
        self.telemetry.publish(TelemetryEvent::JobManagement {
            operation,
            job_id: job.id,
            job_name: job.name.clone(),
            success,
            details,
        });
    }

    async fn refresh_gauges(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.jobs_registered.set(self.registry.len().await as i64);
            metrics.jobs_active.set(self.registry.active_count().await as i64);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.fire_loop.abort();
    }
}

/// Turn trigger ticks into tracked dispatch tasks.
async fn fire_loop(orchestrator: Weak<Orchestrator>, mut fires: FireReceiver) {
    while let Some(fire) = fires.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        if orchestrator.is_draining() {
            debug!(job_id = %fire.job_id, "Orchestrator: draining, dropping tick");
            continue;
        }

        debug!(
            job_id = %fire.job_id,
            scheduled_at = %fire.scheduled_at,
            "Orchestrator: dispatching scheduled run"
        );
        let task_orchestrator = Arc::clone(&orchestrator);
        orchestrator.in_flight.spawn(async move {
            task_orchestrator.run_scheduled(fire.job_id).await;
        });
    }
}
