//! Metrics middleware and instrumentation for the Xalo API.
//!
//! - Request duration and throughput per matched route
//! - Upload outcomes
//! - Orphan sweep removals

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::server::AppState;

/// API request duration histogram.
pub const API_REQUEST_DURATION: &str = "api_request_duration_seconds";

/// API request counter.
pub const API_REQUEST_TOTAL: &str = "api_request_total";

/// Upload counter, labelled by outcome.
pub const UPLOADS_TOTAL: &str = "uploads_total";

/// Orphaned uploads removed by the sweep.
pub const SWEEP_REMOVED_TOTAL: &str = "upload_sweep_removed_total";

const UNMATCHED_ENDPOINT: &str = "unmatched";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops. If another
/// recorder already owns the global slot, a detached handle is returned and
/// `/metrics` renders an empty page.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install prometheus recorder");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            };

            describe_histogram!(API_REQUEST_DURATION, "Duration of API requests in seconds");
            describe_counter!(API_REQUEST_TOTAL, "Total number of API requests");
            describe_counter!(UPLOADS_TOTAL, "Image uploads by outcome");
            describe_counter!(
                SWEEP_REMOVED_TOTAL,
                "Unreferenced uploads removed by the orphan sweep"
            );

            tracing::info!("Prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

pub(crate) fn endpoint_label<B>(request: &Request<B>) -> String {
    request.extensions().get::<MatchedPath>().map_or_else(
        || UNMATCHED_ENDPOINT.to_string(),
        |path| path.as_str().to_string(),
    )
}

/// Middleware that records request metrics.
///
/// - `api_request_duration_seconds{endpoint, method, status_class}`
/// - `api_request_total{endpoint, method, status_class}`
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = endpoint_label(&request);
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let labels = [
        ("endpoint", path.clone()),
        ("method", method.clone()),
        ("status_class", status_class(response.status()).to_string()),
    ];

    histogram!(API_REQUEST_DURATION, &labels).record(duration);
    counter!(API_REQUEST_TOTAL, &labels).increment(1);

    if duration > 1.0 {
        tracing::warn!(
            endpoint = %path,
            method = %method,
            status = %response.status().as_u16(),
            duration_secs = %duration,
            "Slow request detected"
        );
    }

    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

fn metrics_secret_matches(headers: &HeaderMap, secret: &str) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-metrics-secret") == Some(secret)
        || header("authorization").and_then(|v| v.strip_prefix("Bearer ")) == Some(secret)
}

/// Handler for the `/metrics` endpoint.
///
/// When `metrics_secret` is configured the caller must present it.
pub async fn serve_metrics(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(secret) = state.config.metrics_secret.as_deref() {
        if !metrics_secret_matches(&headers, secret) {
            return (StatusCode::UNAUTHORIZED, "metrics secret required").into_response();
        }
    }

    prometheus_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain; charset=utf-8")],
                "Metrics not initialized".to_string(),
            )
                .into_response()
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                handle.render(),
            )
                .into_response()
        },
    )
}

/// Records an upload attempt (`stored`, `rejected`, `too_large`, `failed`).
pub fn record_upload(outcome: &'static str) {
    counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records uploads removed by a sweep.
pub fn record_sweep_removed(count: usize) {
    counter!(SWEEP_REMOVED_TOTAL).increment(u64::try_from(count).unwrap_or(u64::MAX));
}
