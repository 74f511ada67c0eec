//! HTTP endpoint server using Axum

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::core::history::DEFAULT_HISTORY_LIMIT;
use crate::core::orchestrator::{HealthReport, Orchestrator};
use crate::error::JobError;
use crate::metrics::Metrics;
use crate::models::{JobId, JobSummary, JobUpdate, NewJob};
use crate::telemetry::SERVICE_NAME;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
}

/// Error response in the `{ success: false, error }` envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    fn job_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Cron job not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, message),
            JobError::NotFound(_) => Self::job_not_found(),
            JobError::ShuttingDown => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Cron service is shutting down")
            }
            JobError::Internal(detail) => {
                error!(error = %detail, "Internal error while handling request");
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

/// Unknown or malformed ids cannot name a stored job
fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError::job_not_found())
}

#[derive(Serialize)]
struct HealthBody {
    #[serde(flatten)]
    report: HealthReport,
    service: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<impl Serialize> {
    Json(HealthBody {
        report: state.orchestrator.health().await,
        service: SERVICE_NAME,
    })
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

async fn list_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs: Vec<JobSummary> = state.orchestrator.list().await;
    Json(json!({
        "success": true,
        "total": jobs.len(),
        "jobs": jobs,
    }))
}

async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<NewJob>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(request) = payload?;
    let job = state.orchestrator.create(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Cron job created successfully",
            "job": job,
        })),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.orchestrator.get(&parse_job_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "job": job })))
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<JobUpdate>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_job_id(&id)?;
    let Json(update) = payload?;
    let job = state.orchestrator.update(&id, update).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Cron job updated successfully",
        "job": job,
    })))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.delete(&parse_job_id(&id)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Cron job deleted successfully",
    })))
}

async fn toggle_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.orchestrator.toggle(&parse_job_id(&id)?).await?;
    let message = if job.is_active {
        "Cron job activated"
    } else {
        "Cron job deactivated"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "job": {
            "id": job.id,
            "name": job.name,
            "isActive": job.is_active,
        },
    })))
}

async fn execute_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution = state.orchestrator.execute(&parse_job_id(&id)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Cron job executed manually",
        "execution": execution,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    limit: Option<usize>,
    job_id: Option<String>,
}

async fn execution_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = query?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let history = match params.job_id.as_deref().filter(|id| !id.is_empty()) {
        Some(raw) => match raw.parse::<JobId>() {
            Ok(job_id) => state.orchestrator.history(Some(job_id), limit).await,
            Err(_) => Vec::new(),
        },
        None => state.orchestrator.history(None, limit).await,
    };

    Ok(Json(json!({
        "success": true,
        "total": history.len(),
        "history": history,
    })))
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Endpoint not found")
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Unhandled error in request handler");
    ApiError::internal().into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/cron-jobs", get(list_jobs).post(create_job))
        .route(
            "/api/cron-jobs/{id}",
            get(get_job).put(update_job).delete(delete_job),
        )
        .route("/api/cron-jobs/{id}/toggle", patch(toggle_job))
        .route("/api/cron-jobs/{id}/execute", post(execute_job))
        .route("/api/execution-history", get(execution_history))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(cors_layer(cors_origins))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

pub async fn start_server<F>(
    port: u16,
    state: AppState,
    cors_origins: &[String],
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, cors_origins);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
