use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const SERVICE_NAME: &str = "catalog-service";

#[derive(Clone)]
pub struct CatalogMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    gate_outcomes: IntCounterVec,
    http_errors: IntCounterVec,
}

impl CatalogMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "catalog_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let gate_outcomes = IntCounterVec::new(
            Opts::new(
                "catalog_gate_outcomes_total",
                "Request gate decisions grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(gate_outcomes.clone()))?;

        let http_errors = IntCounterVec::new(
            Opts::new("http_errors_total", "HTTP error responses by code"),
            &["service", "code", "status"],
        )?;
        registry.register(Box::new(http_errors.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            gate_outcomes,
            http_errors,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn gate_outcome(&self, outcome: &str) {
        self.gate_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn http_error(&self, code: &str, status: StatusCode) {
        self.http_errors
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }

    pub fn gate_count(&self, outcome: &str) -> u64 {
        self.gate_outcomes.with_label_values(&[outcome]).get()
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
