//! Telemetry module for Astral
//!
//! Prometheus metrics for HTTP traffic and OAuth grant outcomes.

use crate::{AstralError, Result};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// HTTP requests total counter
static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "astral_http_requests_total",
        "Total number of HTTP requests received",
        &["handler", "method", "code"]
    )
    .unwrap()
});

/// HTTP request duration histogram
static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "astral_http_request_duration_seconds",
            "Duration of HTTP requests in seconds"
        ),
        &["handler", "method"]
    )
    .unwrap()
});

/// Token and refresh grants by outcome (OAuth error code or "ok")
static OAUTH_GRANTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "astral_oauth_grants_total",
        "Total number of OAuth grant requests",
        &["grant_type", "outcome"]
    )
    .unwrap()
});

/// Authorization decisions
static OAUTH_AUTHORIZATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "astral_oauth_authorizations_total",
        "Total number of authorization decisions",
        &["client_id", "decision"]
    )
    .unwrap()
});

/// Record HTTP request metric
pub fn record_http_request(handler: &str, method: &str, status_code: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[handler, method, &status_code.to_string()])
        .inc();
}

/// Record HTTP request duration
pub fn record_http_duration(handler: &str, method: &str, duration_secs: f64) {
    HTTP_REQUEST_DURATION
        .with_label_values(&[handler, method])
        .observe(duration_secs);
}

/// Record the outcome of a token or refresh grant
pub fn record_grant(grant_type: &str, outcome: &str) {
    OAUTH_GRANTS_TOTAL
        .with_label_values(&[grant_type, outcome])
        .inc();
}

/// Record an approve/deny decision
pub fn record_authorization(client_id: &str, decision: &str) {
    OAUTH_AUTHORIZATIONS_TOTAL
        .with_label_values(&[client_id, decision])
        .inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AstralError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| AstralError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Axum middleware recording request count and latency per matched route
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let handler = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    record_http_request(&handler, &method, response.status().as_u16());
    record_http_duration(&handler, &method, start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_http_request("/api/oauth/token", "POST", 200);
        record_http_duration("/api/oauth/token", "POST", 0.012);
        record_grant("authorization_code", "ok");
        record_authorization("astral-launcher", "approve");

        let metrics = get_metrics().unwrap();

        assert!(metrics.contains("astral_http_requests_total"));
        assert!(metrics.contains("astral_http_request_duration_seconds"));
        assert!(metrics.contains("astral_oauth_grants_total"));
        assert!(metrics.contains("astral_oauth_authorizations_total"));
    }
}
