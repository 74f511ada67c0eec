//! Unit tests for job definitions and their create/update payloads

use chrono::Utc;
use dhantra_cron::models::{
    JobSummary, JobUpdate, NewJob, DEFAULT_BUY_AMOUNT, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_STRATEGY,
};
use dhantra_cron::JobError;
use serde_json::{json, Value};

fn new_job() -> NewJob {
    NewJob::new(
        "Morning scan",
        "*/2 * * * *",
        vec!["TQQQ".to_string()],
        vec!["+15551234567".to_string()],
    )
}

#[test]
fn test_create_applies_defaults() {
    let now = Utc::now();
    let job = new_job().into_definition(now).unwrap();

    assert!(job.is_active);
    assert_eq!(job.created_at, now);
    assert_eq!(job.strategy, DEFAULT_STRATEGY);
    assert_eq!(job.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
    assert_eq!(job.buy_amount, DEFAULT_BUY_AMOUNT);
    assert_eq!(job.schedule.expression(), "*/2 * * * *");
    assert!(job.updated_at.is_none());
    assert!(job.last_executed.is_none());
}

#[test]
fn test_create_generates_distinct_ids() {
    let a = new_job().into_definition(Utc::now()).unwrap();
    let b = new_job().into_definition(Utc::now()).unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn test_missing_required_fields() {
    let cases = [
        NewJob {
            name: None,
            ..new_job()
        },
        NewJob {
            schedule: None,
            ..new_job()
        },
        NewJob {
            tickers: Some(vec![]),
            ..new_job()
        },
        NewJob {
            phone_numbers: None,
            ..new_job()
        },
        NewJob {
            name: Some(String::new()),
            ..new_job()
        },
    ];

    for request in cases {
        match request.into_definition(Utc::now()) {
            Err(JobError::Validation(message)) => {
                assert_eq!(
                    message,
                    "Missing required fields: name, schedule, tickers, phoneNumbers"
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

#[test]
fn test_invalid_schedule_is_a_validation_error() {
    let request = NewJob {
        schedule: Some("61 * * * *".to_string()),
        ..new_job()
    };
    match request.into_definition(Utc::now()) {
        Err(JobError::Validation(message)) => {
            assert!(message.starts_with("Invalid cron schedule format"))
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_out_of_range_parameters_are_rejected() {
    let threshold = NewJob {
        confidence_threshold: Some(1.5),
        ..new_job()
    };
    assert!(matches!(
        threshold.into_definition(Utc::now()),
        Err(JobError::Validation(_))
    ));

    let amount = NewJob {
        buy_amount: Some(0.0),
        ..new_job()
    };
    assert!(matches!(
        amount.into_definition(Utc::now()),
        Err(JobError::Validation(_))
    ));

    let blank_ticker = NewJob {
        tickers: Some(vec!["TQQQ".to_string(), "  ".to_string()]),
        ..new_job()
    };
    assert!(matches!(
        blank_ticker.into_definition(Utc::now()),
        Err(JobError::Validation(_))
    ));
}

#[test]
fn test_payload_accepts_single_values_or_lists() {
    let request: NewJob = serde_json::from_value(json!({
        "name": "Single",
        "schedule": "0 9 * * 1-5",
        "tickers": "TQQQ",
        "phoneNumbers": ["+15551234567", "+15557654321"],
        "confidenceThreshold": 0.8
    }))
    .unwrap();

    assert_eq!(request.tickers, Some(vec!["TQQQ".to_string()]));
    assert_eq!(request.phone_numbers.as_ref().map(Vec::len), Some(2));
    assert_eq!(request.confidence_threshold, Some(0.8));
    assert!(request.strategy.is_none());

    let empty: NewJob = serde_json::from_value(json!({})).unwrap();
    assert!(empty.tickers.is_none());
}

#[test]
fn test_update_merges_and_stamps() {
    let job = new_job().into_definition(Utc::now()).unwrap();
    let update = JobUpdate {
        name: Some("Renamed".to_string()),
        buy_amount: Some(2500.0),
        ..Default::default()
    };

    let now = Utc::now();
    let updated = update.apply(&job, now).unwrap();
    assert_eq!(updated.id, job.id);
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.buy_amount, 2500.0);
    assert_eq!(updated.tickers, job.tickers);
    assert_eq!(updated.schedule, job.schedule);
    assert_eq!(updated.updated_at, Some(now));
}

#[test]
fn test_rejected_update_leaves_job_untouched() {
    let job = new_job().into_definition(Utc::now()).unwrap();
    let before = job.clone();

    assert!(JobUpdate::schedule("not a schedule").apply(&job, Utc::now()).is_err());
    let blank = JobUpdate {
        phone_numbers: Some(vec![]),
        ..Default::default()
    };
    assert!(blank.apply(&job, Utc::now()).is_err());
    assert_eq!(job, before);
}

#[test]
fn test_summary_omits_internal_fields() {
    let job = new_job().into_definition(Utc::now()).unwrap();
    let summary: Value = serde_json::to_value(JobSummary::from(&job)).unwrap();

    assert_eq!(summary["id"], json!(job.id));
    assert_eq!(summary["schedule"], "*/2 * * * *");
    assert_eq!(summary["isActive"], true);
    assert_eq!(summary["phoneNumbers"], json!(["+15551234567"]));
    assert!(summary.get("updatedAt").is_none());
    assert!(summary.get("lastExecuted").is_some());
}

#[test]
fn test_definition_serializes_camel_case() {
    let job = new_job().into_definition(Utc::now()).unwrap();
    let value = serde_json::to_value(&job).unwrap();
    for key in [
        "id",
        "name",
        "schedule",
        "tickers",
        "strategy",
        "confidenceThreshold",
        "buyAmount",
        "phoneNumbers",
        "isActive",
        "createdAt",
        "updatedAt",
        "lastExecuted",
    ] {
        assert!(value.get(key).is_some(), "missing key {}", key);
    }
}
