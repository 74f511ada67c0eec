//! Unit tests for the job registry

use chrono::{TimeZone, Utc};
use dhantra_cron::core::registry::JobRegistry;
use dhantra_cron::models::{JobDefinition, NewJob};
use uuid::Uuid;

fn job(name: &str) -> JobDefinition {
    NewJob::new(
        name,
        "*/5 * * * *",
        vec!["TQQQ".to_string()],
        vec!["+15551234567".to_string()],
    )
    .into_definition(Utc::now())
    .unwrap()
}

#[tokio::test]
async fn test_list_keeps_insertion_order() {
    let registry = JobRegistry::new();
    let names = ["first", "second", "third"];
    for name in names {
        registry.insert(job(name)).await;
    }

    let listed: Vec<String> = registry.list().await.into_iter().map(|j| j.name).collect();
    assert_eq!(listed, names);
    assert_eq!(registry.len().await, 3);
}

#[tokio::test]
async fn test_get_returns_snapshot() {
    let registry = JobRegistry::new();
    let stored = job("snapshot");
    registry.insert(stored.clone()).await;

    let mut copy = registry.get(&stored.id).await.unwrap();
    copy.name = "changed locally".to_string();
    assert_eq!(registry.get(&stored.id).await.unwrap().name, "snapshot");
    assert!(registry.get(&Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn test_replace_keeps_recorded_last_executed() {
    let registry = JobRegistry::new();
    let original = job("replace");
    registry.insert(original.clone()).await;

    let fired_at = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
    assert!(registry.mark_executed(&original.id, fired_at).await);

    let mut edited = original.clone();
    edited.name = "renamed".to_string();
    let stored = registry.replace(edited).await.unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.last_executed, Some(fired_at));
}

#[tokio::test]
async fn test_replace_and_mark_on_missing_job() {
    let registry = JobRegistry::new();
    let absent = job("absent");
    assert!(registry.replace(absent.clone()).await.is_none());
    assert!(!registry.mark_executed(&absent.id, Utc::now()).await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_remove_and_active_count() {
    let registry = JobRegistry::new();
    let kept = job("kept");
    let mut paused = job("paused");
    paused.is_active = false;
    let removed = job("removed");
    for j in [kept.clone(), paused.clone(), removed.clone()] {
        registry.insert(j).await;
    }
    assert_eq!(registry.active_count().await, 2);

    assert_eq!(registry.remove(&removed.id).await.map(|j| j.id), Some(removed.id));
    assert!(registry.remove(&removed.id).await.is_none());
    assert_eq!(registry.active_count().await, 1);

    let ids: Vec<_> = registry.list().await.into_iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![kept.id, paused.id]);
}
