//! Prometheus metrics for the cron service

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: IntGauge,
    pub jobs_registered: IntGauge,
    pub jobs_active: IntGauge,
    /// Labelled by `status` (SUCCESS/FAILED) and `trigger` (scheduled/manual)
    pub executions_total: IntCounterVec,
    pub execution_duration_seconds: Histogram,
    pub telemetry_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total number of HTTP requests")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ))?;
        let http_requests_in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Number of HTTP requests currently being served",
        )?;
        let jobs_registered =
            IntGauge::new("cron_jobs_registered", "Number of registered cron jobs")?;
        let jobs_active = IntGauge::new("cron_jobs_active", "Number of active cron jobs")?;
        let executions_total = IntCounterVec::new(
            Opts::new("cron_executions_total", "Cron job executions by outcome"),
            &["status", "trigger"],
        )?;
        let execution_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "cron_execution_duration_seconds",
                "Duration of calls to the execution API",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;
        let telemetry_failures_total = IntCounter::new(
            "telemetry_failures_total",
            "Telemetry writes that failed and were dropped",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(jobs_registered.clone()))?;
        registry.register(Box::new(jobs_active.clone()))?;
        registry.register(Box::new(executions_total.clone()))?;
        registry.register(Box::new(execution_duration_seconds.clone()))?;
        registry.register(Box::new(telemetry_failures_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            jobs_registered,
            jobs_active,
            executions_total,
            execution_duration_seconds,
            telemetry_failures_total,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
