//! Unit tests for the execution history store

use chrono::{DateTime, Duration, TimeZone, Utc};
use dhantra_cron::core::history::{HistoryStore, DEFAULT_HISTORY_LIMIT};
use dhantra_cron::models::{ExecutionOutcome, ExecutionRecord, JobId, TriggerKind};
use serde_json::json;
use uuid::Uuid;

fn record(job_id: JobId, at: DateTime<Utc>) -> ExecutionRecord {
    ExecutionRecord {
        execution_id: Uuid::new_v4(),
        job_id,
        job_name: "Morning scan".to_string(),
        trigger: TriggerKind::Scheduled,
        execution_time_ms: 12,
        timestamp: at,
        outcome: ExecutionOutcome::Success {
            response: json!({ "ok": true }),
        },
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_query_returns_newest_first() {
    let store = HistoryStore::unbounded();
    let job = Uuid::new_v4();
    for minutes in 0..3 {
        store.append(record(job, base_time() + Duration::minutes(minutes))).await;
    }

    let records = store.query(Some(job), DEFAULT_HISTORY_LIMIT).await;
    assert_eq!(records.len(), 3);
    assert!(records[0].timestamp > records[1].timestamp);
    assert!(records[1].timestamp > records[2].timestamp);
}

#[tokio::test]
async fn test_limit_one_returns_most_recent() {
    let store = HistoryStore::unbounded();
    let job = Uuid::new_v4();
    let mut latest = None;
    for minutes in 0..3 {
        let r = record(job, base_time() + Duration::minutes(minutes));
        latest = Some(r.execution_id);
        store.append(r).await;
    }

    let records = store.query(Some(job), 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(Some(records[0].execution_id), latest);
}

#[tokio::test]
async fn test_out_of_order_appends_are_sorted_by_timestamp() {
    let store = HistoryStore::unbounded();
    let job = Uuid::new_v4();
    let late = record(job, base_time() + Duration::minutes(5));
    let early = record(job, base_time());
    store.append(late.clone()).await;
    store.append(early.clone()).await;

    let records = store.query(None, 10).await;
    assert_eq!(records[0].execution_id, late.execution_id);
    assert_eq!(records[1].execution_id, early.execution_id);
}

#[tokio::test]
async fn test_query_filters_by_job() {
    let store = HistoryStore::unbounded();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    store.append(record(first, base_time())).await;
    store.append(record(second, base_time())).await;
    store.append(record(first, base_time() + Duration::minutes(1))).await;

    assert_eq!(store.query(Some(first), 50).await.len(), 2);
    assert_eq!(store.query(Some(second), 50).await.len(), 1);
    assert_eq!(store.query(Some(Uuid::new_v4()), 50).await.len(), 0);
    assert_eq!(store.query(None, 50).await.len(), 3);
    assert_eq!(store.query(None, 0).await.len(), 0);
}

#[tokio::test]
async fn test_capacity_evicts_oldest() {
    let store = HistoryStore::new(Some(2));
    let job = Uuid::new_v4();
    let oldest = record(job, base_time());
    store.append(oldest.clone()).await;
    store.append(record(job, base_time() + Duration::minutes(1))).await;
    store.append(record(job, base_time() + Duration::minutes(2))).await;

    assert_eq!(store.len().await, 2);
    let records = store.query(None, 10).await;
    assert!(records.iter().all(|r| r.execution_id != oldest.execution_id));
}

#[tokio::test]
async fn test_zero_capacity_means_unbounded() {
    let store = HistoryStore::new(Some(0));
    assert_eq!(store.capacity(), None);
    assert!(store.is_empty().await);

    let job = Uuid::new_v4();
    for minutes in 0..5 {
        store.append(record(job, base_time() + Duration::minutes(minutes))).await;
    }
    assert_eq!(store.len().await, 5);
}
