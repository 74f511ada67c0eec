//! Cron-driven trigger engine
//!
//! One timer task per armed job. A timer only knows the job id and its
//! schedule; on every tick it sends a [`Fire`] down a channel and leaves the
//! rest (re-reading the job, the active check, dispatch) to the receiver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::schedule::CronSchedule;
use crate::models::JobId;

/// A timer tick for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    pub job_id: JobId,
    pub scheduled_at: DateTime<Utc>,
}

pub type FireReceiver = mpsc::UnboundedReceiver<Fire>;

struct ArmedTrigger {
    schedule: String,
    task: JoinHandle<()>,
}

pub struct TriggerEngine {
    fires: mpsc::UnboundedSender<Fire>,
    armed: Mutex<HashMap<JobId, ArmedTrigger>>,
    arm_count: AtomicU64,
    disarm_count: AtomicU64,
    closed: AtomicBool,
}

impl TriggerEngine {
    /// Create an engine and the receiving end of its tick channel
    pub fn new() -> (Self, FireReceiver) {
        let (fires, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            fires,
            armed: Mutex::new(HashMap::new()),
            arm_count: AtomicU64::new(0),
            disarm_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        (engine, receiver)
    }

    /// Arm (or re-arm) the timer for `job_id`.
    ///
    /// A previous timer for the same job is aborted while the table lock is
    /// held, so at most one timer per job is ever pending. Returns false once
    /// the engine has been shut down.
    pub async fn arm(&self, job_id: JobId, schedule: &CronSchedule) -> bool {
        let mut armed = self.armed.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            warn!(job_id = %job_id, "TriggerEngine: shut down, refusing to arm job {}", job_id);
            return false;
        }

        let task = tokio::spawn(run_timer(job_id, schedule.clone(), self.fires.clone()));
        let previous = armed.insert(
            job_id,
            ArmedTrigger {
                schedule: schedule.expression().to_string(),
                task,
            },
        );
        self.arm_count.fetch_add(1, Ordering::SeqCst);

        match previous {
            Some(old) => {
                old.task.abort();
                info!(
                    job_id = %job_id,
                    old_schedule = %old.schedule,
                    schedule = %schedule,
                    "TriggerEngine: re-armed job {} ({} -> {})",
                    job_id,
                    old.schedule,
                    schedule
                );
            }
            None => {
                info!(
                    job_id = %job_id,
                    schedule = %schedule,
                    "TriggerEngine: armed job {} with schedule {}",
                    job_id,
                    schedule
                );
            }
        }
        true
    }

    /// Stop the timer for `job_id`. Returns whether a timer was armed.
    ///
    /// A tick already sent before the abort is still delivered, so a job can
    /// see at most one more fire after disarming; receivers must re-check the
    /// job before dispatching.
    pub async fn disarm(&self, job_id: &JobId) -> bool {
        let removed = self.armed.lock().await.remove(job_id);
        match removed {
            Some(trigger) => {
                trigger.task.abort();
                self.disarm_count.fetch_add(1, Ordering::SeqCst);
                info!(job_id = %job_id, "TriggerEngine: disarmed job {}", job_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, job_id: &JobId) -> bool {
        self.armed.lock().await.contains_key(job_id)
    }

    /// Schedule expression of the currently armed timer
    pub async fn armed_schedule(&self, job_id: &JobId) -> Option<String> {
        self.armed
            .lock()
            .await
            .get(job_id)
            .map(|trigger| trigger.schedule.clone())
    }

    pub async fn armed_count(&self) -> usize {
        self.armed.lock().await.len()
    }

    /// Total arm operations, re-arms included
    pub fn arm_count(&self) -> u64 {
        self.arm_count.load(Ordering::SeqCst)
    }

    pub fn disarm_count(&self) -> u64 {
        self.disarm_count.load(Ordering::SeqCst)
    }

    /// Abort every timer and refuse further arming
    pub async fn shutdown(&self) {
        let mut armed = self.armed.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        let count = armed.len();
        for (_, trigger) in armed.drain() {
            trigger.task.abort();
        }
        info!(stopped = count, "TriggerEngine: stopped {} timers", count);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TriggerEngine {
    fn drop(&mut self) {
        for (_, trigger) in self.armed.get_mut().drain() {
            trigger.task.abort();
        }
    }
}

async fn run_timer(job_id: JobId, schedule: CronSchedule, fires: mpsc::UnboundedSender<Fire>) {
    let mut cursor = Utc::now();

    loop {
        let Some(next_tick) = schedule.next_after(&cursor) else {
            warn!(
                job_id = %job_id,
                schedule = %schedule,
                "TriggerEngine: schedule {} has no upcoming fire time, timer for job {} ends",
                schedule,
                job_id
            );
            return;
        };

        let now = Utc::now();
        if next_tick > now {
            let duration = (next_tick - now).to_std().unwrap_or_default();
            tokio::time::sleep(duration).await;
        }
        // Ticks missed while the process was stalled are not replayed
        cursor = next_tick.max(Utc::now());

        debug!(
            job_id = %job_id,
            scheduled_at = %next_tick,
            "TriggerEngine: tick for job {}",
            job_id
        );

        if fires.send(Fire { job_id, scheduled_at: next_tick }).is_err() {
            debug!(job_id = %job_id, "TriggerEngine: fire receiver closed, timer ends");
            return;
        }
    }
}
