//! Core application primitives (engines, orchestrators)

pub mod dispatcher;
pub mod history;
pub mod http;
pub mod orchestrator;
pub mod registry;
pub mod schedule;
pub mod trigger;

pub use dispatcher::{ExecutionDispatcher, ExecutionRequest, DEFAULT_EXECUTION_TIMEOUT, EXECUTE_PATH};
pub use history::{HistoryStore, DEFAULT_HISTORY_LIMIT};
pub use orchestrator::{HealthReport, Orchestrator, ShutdownReport};
pub use registry::JobRegistry;
pub use schedule::{validate, CronSchedule};
pub use trigger::{Fire, FireReceiver, TriggerEngine};
