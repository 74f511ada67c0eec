//! Integration tests for the HTTP API
//!
//! Tests the job management endpoints, response envelopes, health and metrics.

use serde_json::{json, Value};
use uuid::Uuid;

use axum::http::{header, HeaderValue};
use axum_test::TestServer;
use dhantra_cron::core::http::{create_router, AppState};

use crate::test_utils::{TestApiServer, TestOrchestrator};

fn job_payload() -> Value {
    json!({
        "name": "Morning scan",
        "schedule": "*/2 * * * *",
        "tickers": ["TQQQ"],
        "phoneNumbers": ["+15551234567"],
    })
}

async fn create(app: &TestApiServer) -> Value {
    let response = app.server.post("/api/cron-jobs").json(&job_payload()).await;
    assert_eq!(response.status_code(), 201);
    response.json::<Value>()["job"].clone()
}

#[tokio::test]
async fn health_endpoint_reports_counts() {
    let app = TestApiServer::new().await;
    create(&app).await;

    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeJobCount"], 1);
    assert_eq!(body["totalJobs"], 1);
    assert_eq!(body["service"], "dhantra-cron-service");
    assert!(body["uptime"].as_u64().is_some());
    assert!(body.get("uptimeSeconds").is_none());
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_metrics() {
    let app = TestApiServer::new().await;
    let _ = app.server.get("/health").await;

    let response = app.server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);

    let body = response.text();
    for metric in [
        "http_requests_total",
        "http_request_duration_seconds",
        "http_requests_in_flight",
        "cron_jobs_registered",
        "cron_jobs_active",
    ] {
        assert!(body.contains(metric), "Expected {} metric", metric);
    }
}

#[tokio::test]
async fn create_job_returns_created_envelope() {
    let app = TestApiServer::new().await;
    let response = app.server.post("/api/cron-jobs").json(&job_payload()).await;
    assert_eq!(response.status_code(), 201);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Cron job created successfully");
    assert_eq!(body["job"]["isActive"], true);
    assert_eq!(body["job"]["strategy"], "Reversal");
    assert_eq!(body["job"]["confidenceThreshold"], 0.7);
    assert_eq!(body["job"]["buyAmount"], 1000.0);
    assert!(body["job"]["id"].as_str().is_some());
    assert!(body["job"]["createdAt"].as_str().is_some());
}

#[tokio::test]
async fn create_job_validates_input() {
    let app = TestApiServer::new().await;

    let response = app
        .server
        .post("/api/cron-jobs")
        .json(&json!({ "name": "No schedule", "tickers": ["TQQQ"] }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Missing required fields: name, schedule, tickers, phoneNumbers"
    );

    let mut bad_schedule = job_payload();
    bad_schedule["schedule"] = json!("every minute");
    let response = app.server.post("/api/cron-jobs").json(&bad_schedule).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid cron schedule format"));

    let response = app
        .server
        .post("/api/cron-jobs")
        .content_type("application/json")
        .text("{not json")
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["success"], false);
}

#[tokio::test]
async fn list_and_get_jobs() {
    let app = TestApiServer::new().await;
    let job = create(&app).await;
    let id = job["id"].as_str().unwrap();

    let response = app.server.get("/api/cron-jobs").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1);
    assert_eq!(body["jobs"][0]["id"], id);
    assert!(body["jobs"][0].get("updatedAt").is_none());

    let response = app.server.get(&format!("/api/cron-jobs/{}", id)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["job"]["name"], "Morning scan");
}

#[tokio::test]
async fn unknown_jobs_return_not_found() {
    let app = TestApiServer::new().await;
    let missing = Uuid::new_v4();

    for path in [
        format!("/api/cron-jobs/{}", missing),
        "/api/cron-jobs/not-a-uuid".to_string(),
    ] {
        let response = app.server.get(&path).await;
        assert_eq!(response.status_code(), 404);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Cron job not found");
    }

    let response = app
        .server
        .delete(&format!("/api/cron-jobs/{}", missing))
        .await;
    assert_eq!(response.status_code(), 404);

    let response = app
        .server
        .patch(&format!("/api/cron-jobs/{}/toggle", missing))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn update_job_merges_fields() {
    let app = TestApiServer::new().await;
    let job = create(&app).await;
    let id = job["id"].as_str().unwrap();

    let response = app
        .server
        .put(&format!("/api/cron-jobs/{}", id))
        .json(&json!({ "schedule": "0 9 * * 1-5", "tickers": "SQQQ" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "Cron job updated successfully");
    assert_eq!(body["job"]["schedule"], "0 9 * * 1-5");
    assert_eq!(body["job"]["tickers"], json!(["SQQQ"]));
    assert!(body["job"]["updatedAt"].as_str().is_some());

    let response = app
        .server
        .put(&format!("/api/cron-jobs/{}", id))
        .json(&json!({ "schedule": "0 25 * * *" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let stored = app.server.get(&format!("/api/cron-jobs/{}", id)).await;
    assert_eq!(stored.json::<Value>()["job"]["schedule"], "0 9 * * 1-5");
}

#[tokio::test]
async fn toggle_job_flips_active_flag() {
    let app = TestApiServer::new().await;
    let job = create(&app).await;
    let id = job["id"].as_str().unwrap();

    let response = app
        .server
        .patch(&format!("/api/cron-jobs/{}/toggle", id))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "Cron job deactivated");
    assert_eq!(body["job"], json!({ "id": id, "name": "Morning scan", "isActive": false }));

    let response = app
        .server
        .patch(&format!("/api/cron-jobs/{}/toggle", id))
        .await;
    assert_eq!(response.json::<Value>()["message"], "Cron job activated");
}

#[tokio::test]
async fn execute_job_and_read_history() {
    let app = TestApiServer::new().await;
    let job = create(&app).await;
    let id = job["id"].as_str().unwrap();

    let response = app
        .server
        .post(&format!("/api/cron-jobs/{}/execute", id))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "Cron job executed manually");
    assert_eq!(body["execution"]["status"], "SUCCESS");
    assert_eq!(body["execution"]["jobId"], id);
    assert_eq!(body["execution"]["response"], json!({ "success": true }));

    let response = app
        .server
        .get("/api/execution-history")
        .add_query_param("jobId", id)
        .add_query_param("limit", 10)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["history"][0]["trigger"], "manual");

    let response = app
        .server
        .get("/api/execution-history")
        .add_query_param("jobId", "unknown")
        .await;
    assert_eq!(response.json::<Value>()["total"], 0);

    let response = app
        .server
        .get("/api/execution-history")
        .add_query_param("limit", "many")
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn delete_job_keeps_history() {
    let app = TestApiServer::new().await;
    let job = create(&app).await;
    let id = job["id"].as_str().unwrap();

    app.server
        .post(&format!("/api/cron-jobs/{}/execute", id))
        .await;
    let response = app.server.delete(&format!("/api/cron-jobs/{}", id)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.json::<Value>()["message"],
        "Cron job deleted successfully"
    );

    let list = app.server.get("/api/cron-jobs").await;
    assert_eq!(list.json::<Value>()["total"], 0);

    let history = app
        .server
        .get("/api/execution-history")
        .add_query_param("jobId", id)
        .await;
    assert_eq!(history.json::<Value>()["total"], 1);
}

#[tokio::test]
async fn unknown_route_returns_not_found_envelope() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/api/does-not-exist").await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["error"], "Endpoint not found");
}

#[tokio::test]
async fn wildcard_cors_entry_is_ignored() {
    let TestOrchestrator {
        orchestrator,
        metrics,
        ..
    } = TestOrchestrator::new().await;
    let state = AppState {
        orchestrator,
        metrics,
    };
    let origins = ["*".to_string(), "https://dhantra-web-app.web.app".to_string()];
    let server = TestServer::new(create_router(state, &origins)).expect("start test server");

    let response = server
        .get("/health")
        .add_header(
            header::ORIGIN,
            HeaderValue::from_static("https://dhantra-web-app.web.app"),
        )
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "https://dhantra-web-app.web.app"
    );
}
