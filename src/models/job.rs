//! Job definitions and the create/update payloads that produce them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::core::schedule::CronSchedule;
use crate::error::JobError;

pub type JobId = Uuid;

pub const DEFAULT_STRATEGY: &str = "Reversal";
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_BUY_AMOUNT: f64 = 1000.0;

const MISSING_FIELDS: &str = "Missing required fields: name, schedule, tickers, phoneNumbers";

/// A recurring trading job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub id: JobId,
    pub name: String,
    pub schedule: CronSchedule,
    pub tickers: Vec<String>,
    pub strategy: String,
    pub confidence_threshold: f64,
    pub buy_amount: f64,
    pub phone_numbers: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_executed: Option<DateTime<Utc>>,
}

impl JobDefinition {
    /// Check the invariants every stored definition must satisfy.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::Validation("name must not be blank".to_string()));
        }
        validate_list("tickers", &self.tickers)?;
        validate_list("phoneNumbers", &self.phone_numbers)?;
        if self.strategy.trim().is_empty() {
            return Err(JobError::Validation("strategy must not be blank".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(JobError::Validation(format!(
                "confidenceThreshold must be between 0 and 1, got {}",
                self.confidence_threshold
            )));
        }
        if !self.buy_amount.is_finite() || self.buy_amount <= 0.0 {
            return Err(JobError::Validation(format!(
                "buyAmount must be positive, got {}",
                self.buy_amount
            )));
        }
        Ok(())
    }
}

fn validate_list(field: &str, values: &[String]) -> Result<(), JobError> {
    if values.is_empty() {
        return Err(JobError::Validation(format!("{} must not be empty", field)));
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(JobError::Validation(format!(
            "{} must not contain blank entries",
            field
        )));
    }
    Ok(())
}

/// Listing projection of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub schedule: String,
    pub tickers: Vec<String>,
    pub strategy: String,
    pub confidence_threshold: f64,
    pub buy_amount: f64,
    pub phone_numbers: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_executed: Option<DateTime<Utc>>,
}

impl From<&JobDefinition> for JobSummary {
    fn from(job: &JobDefinition) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            schedule: job.schedule.expression().to_string(),
            tickers: job.tickers.clone(),
            strategy: job.strategy.clone(),
            confidence_threshold: job.confidence_threshold,
            buy_amount: job.buy_amount,
            phone_numbers: job.phone_numbers.clone(),
            is_active: job.is_active,
            created_at: job.created_at,
            last_executed: job.last_executed,
        }
    }
}

/// Accepts either `"TQQQ"` or `["TQQQ", "SQQQ"]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(list) => list,
    }))
}

/// Request to create a job. Optional fields take the service defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub name: Option<String>,
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub tickers: Option<Vec<String>>,
    pub strategy: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub buy_amount: Option<f64>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub phone_numbers: Option<Vec<String>>,
}

impl NewJob {
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        tickers: Vec<String>,
        phone_numbers: Vec<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            schedule: Some(schedule.into()),
            tickers: Some(tickers),
            phone_numbers: Some(phone_numbers),
            ..Default::default()
        }
    }

    /// Validate the request and build an active definition with a fresh id.
    pub fn into_definition(self, now: DateTime<Utc>) -> Result<JobDefinition, JobError> {
        let (Some(name), Some(schedule), Some(tickers), Some(phone_numbers)) =
            (self.name, self.schedule, self.tickers, self.phone_numbers)
        else {
            return Err(JobError::Validation(MISSING_FIELDS.to_string()));
        };
        if name.is_empty() || schedule.is_empty() || tickers.is_empty() || phone_numbers.is_empty() {
            return Err(JobError::Validation(MISSING_FIELDS.to_string()));
        }

        let schedule = CronSchedule::parse(&schedule)?;
        let job = JobDefinition {
            id: Uuid::new_v4(),
            name,
            schedule,
            tickers,
            strategy: self.strategy.unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            buy_amount: self.buy_amount.unwrap_or(DEFAULT_BUY_AMOUNT),
            phone_numbers,
            is_active: true,
            created_at: now,
            updated_at: None,
            last_executed: None,
        };
        job.validate()?;
        Ok(job)
    }
}

/// Partial update of a job. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub name: Option<String>,
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub tickers: Option<Vec<String>>,
    pub strategy: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub buy_amount: Option<f64>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub phone_numbers: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl JobUpdate {
    pub fn schedule(schedule: impl Into<String>) -> Self {
        Self {
            schedule: Some(schedule.into()),
            ..Default::default()
        }
    }

    /// Merge into a copy of `current`. The original is left untouched on error.
    pub fn apply(&self, current: &JobDefinition, now: DateTime<Utc>) -> Result<JobDefinition, JobError> {
        let mut job = current.clone();

        if let Some(expr) = &self.schedule {
            if expr != current.schedule.expression() {
                job.schedule = CronSchedule::parse(expr)?;
            }
        }
        if let Some(name) = &self.name {
            job.name = name.clone();
        }
        if let Some(tickers) = &self.tickers {
            job.tickers = tickers.clone();
        }
        if let Some(strategy) = &self.strategy {
            job.strategy = strategy.clone();
        }
        if let Some(threshold) = self.confidence_threshold {
            job.confidence_threshold = threshold;
        }
        if let Some(amount) = self.buy_amount {
            job.buy_amount = amount;
        }
        if let Some(phone_numbers) = &self.phone_numbers {
            job.phone_numbers = phone_numbers.clone();
        }
        if let Some(active) = self.is_active {
            job.is_active = active;
        }

        job.validate()?;
        job.updated_at = Some(now);
        Ok(job)
    }
}
