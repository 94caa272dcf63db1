//! Fetch broker routes
//!
//! The privileged side of cross-origin image retrieval: pages that cannot
//! read a foreign image ask the broker, which downloads it and answers with
//! a data URL.

use crate::loader::{fetch_as_data_url, FetchImageRequest, FetchImageResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Counter of broker fetches by outcome
pub const BROKER_FETCHES_TOTAL: &str = "pageguard_broker_fetches_total";

/// Shared broker state
#[derive(Clone)]
pub struct BrokerState {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    client: reqwest::Client,
    timeout: Duration,
    metrics: Option<PrometheusHandle>,
}

impl BrokerState {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                client,
                timeout,
                metrics: None,
            }),
        }
    }

    pub fn with_metrics(client: reqwest::Client, timeout: Duration, handle: PrometheusHandle) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                client,
                timeout,
                metrics: Some(handle),
            }),
        }
    }
}

pub fn create_router(state: BrokerState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/fetch-image", post(fetch_image))
        .fallback(fallback)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<BrokerState>) -> impl IntoResponse {
    match &state.inner.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed".to_string()),
    }
}

/// `POST /fetch-image {url}` → `{success, dataUrl}` or `{success: false, error}`
pub async fn fetch_image(
    State(state): State<BrokerState>,
    Json(request): Json<FetchImageRequest>,
) -> Json<FetchImageResponse> {
    let response = match validate_url(&request.url) {
        Err(message) => FetchImageResponse::failed(message),
        Ok(url) => match fetch_as_data_url(&state.inner.client, url.as_str(), state.inner.timeout).await {
            Ok(data) if data.is_image() => {
                debug!(%url, bytes = data.bytes.len(), "Image fetched for page");
                FetchImageResponse::ok(&data)
            }
            Ok(data) => FetchImageResponse::failed(format!("not an image: {}", data.mime)),
            Err(e) => {
                warn!(%url, "Broker fetch failed: {}", e);
                FetchImageResponse::failed(e.to_string())
            }
        },
    };

    let outcome = if response.success { "ok" } else { "failed" };
    metrics::counter!(BROKER_FETCHES_TOTAL, "outcome" => outcome).increment(1);
    Json(response)
}

/// Only absolute http(s) URLs are fetched
fn validate_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme: {}", other)),
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}
