//! Scrape and status HTTP endpoints.
//!
//! - `/metrics`         : plugin metrics from the serving cache
//! - `/default-metrics` : process + exporter self metrics
//! - anything else      : status line with start time and uptime

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::config::RefreshPolicy;
use crate::refresh::RefreshOutcome;

/// Response header carrying the snapshot's publish time (epoch ms).
pub const LAST_UPDATED_HEADER: &str = "x-metrics-last-updated";

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    if state.cfg().refresh.policy == RefreshPolicy::OnRequest {
        if let RefreshOutcome::RenderFailed { error, .. } = state.coordinator().refresh_or_join().await {
            tracing::error!(%error, "scrape-time refresh failed");
            return internal_error();
        }
    }

    let snapshot = state.cache().read();
    let body = snapshot.as_ref().map(|s| s.text.clone()).unwrap_or_default();
    let mut resp = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    )
        .into_response();

    if let Some(s) = snapshot {
        if let Ok(v) = HeaderValue::from_str(&s.last_updated_ms().to_string()) {
            resp.headers_mut().insert(LAST_UPDATED_HEADER, v);
        }
    }
    resp
}

pub async fn default_metrics(State(state): State<AppState>) -> Response {
    match state.obs().render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "default metrics render failed");
            internal_error()
        }
    }
}

pub async fn status(State(state): State<AppState>) -> String {
    format!(
        "Server started at {}, uptime: {}ms",
        state.started_at_ms(),
        state.uptime_ms()
    )
}
