//! Dhantra cron service
//!
//! Keeps declarative trading jobs on recurring cron triggers and dispatches
//! each firing to the Dhantra core execution API, recording the outcome.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod telemetry;

pub use error::{DispatchError, JobError, ScheduleError};
