//! Router-level tests: scrape, default metrics, and status endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use hotprom_core::MetricRegistry;
use hotprom_exporter::app_state::AppState;
use hotprom_exporter::config::{OnRemove, RefreshPolicy};
use hotprom_exporter::ops::LAST_UPDATED_HEADER;
use hotprom_exporter::router::build_router;

use common::{cfg, cfg_with, gauge_script, write, FlakyRenderer};

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let ctype = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, ctype, String::from_utf8(body.to_vec()).unwrap())
}

fn uptime(status_line: &str) -> u64 {
    let tail = status_line.split("uptime: ").nth(1).expect("uptime field");
    tail.trim_end_matches("ms").parse().expect("numeric uptime")
}

#[tokio::test]
async fn metrics_serves_cached_plugin_output() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.rhai", &gauge_script("metric_name_1", 10));
    write(dir.path(), "b.txt", "not a plugin");

    let state = AppState::new(cfg(dir.path())).unwrap();
    let tasks = state.start().await;
    let app = build_router(state);

    let (status, ctype, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctype.as_deref(), Some(prometheus::TEXT_FORMAT));
    assert!(body.contains("# TYPE metric_name_1 gauge"), "{body}");
    assert!(body.contains("metric_name_1 10"), "{body}");
    assert!(!body.contains("not a plugin"));

    for t in tasks {
        t.abort();
    }
}

#[tokio::test]
async fn metrics_sets_last_updated_header() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(cfg(dir.path())).unwrap();
    state.coordinator().refresh().await;
    let app = build_router(state.clone());

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let header = resp.headers().get(LAST_UPDATED_HEADER).unwrap().to_str().unwrap();
    let expected = state.cache().read().unwrap().last_updated_ms().to_string();
    assert_eq!(header, expected);
}

#[tokio::test]
async fn metrics_is_empty_before_first_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(AppState::new(cfg(dir.path())).unwrap());

    let (status, _, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn interval_policy_serves_previous_snapshot_on_render_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "a.rhai", &gauge_script("metric_name_1", 10));
    let registry = Arc::new(MetricRegistry::new());
    let renderer = FlakyRenderer::new(Arc::clone(&registry));
    let state = AppState::with_renderer(cfg(dir.path()), registry, renderer.clone()).unwrap();
    state.loader().load(&path).await.unwrap();
    state.coordinator().refresh().await;

    renderer.set_failing(true);
    state.coordinator().refresh().await;

    let (status, _, body) = get(&build_router(state), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("metric_name_1 10"));
}

#[tokio::test]
async fn on_request_policy_refreshes_per_scrape() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "a.rhai", &gauge_script("metric_name_1", 10));
    let state =
        AppState::new(cfg_with(dir.path(), RefreshPolicy::OnRequest, OnRemove::Retain)).unwrap();
    state.loader().load(&path).await.unwrap();
    let app = build_router(state.clone());

    let (_, _, body) = get(&app, "/metrics").await;
    assert!(body.contains("metric_name_1 10"), "{body}");

    write(dir.path(), "a.rhai", &gauge_script("metric_name_1", 99));
    state.loader().load(&path).await.unwrap();

    let (_, _, body) = get(&app, "/metrics").await;
    assert!(body.contains("metric_name_1 99"), "{body}");
}

#[tokio::test]
async fn on_request_policy_returns_500_when_render_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MetricRegistry::new());
    let renderer = FlakyRenderer::new(Arc::clone(&registry));
    renderer.set_failing(true);
    let state = AppState::with_renderer(
        cfg_with(dir.path(), RefreshPolicy::OnRequest, OnRemove::Retain),
        registry,
        renderer,
    )
    .unwrap();

    let (status, _, body) = get(&build_router(state), "/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal Server Error");
}

#[tokio::test]
async fn default_metrics_are_separate_from_plugin_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.rhai", &gauge_script("metric_name_1", 10));
    let state = AppState::new(cfg(dir.path())).unwrap();
    state.loader().load_all(dir.path()).await.unwrap();
    state.coordinator().refresh().await;
    let app = build_router(state);

    let (status, ctype, body) = get(&app, "/default-metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctype.as_deref(), Some(prometheus::TEXT_FORMAT));
    assert!(body.contains("hotprom_plugins_loaded 1"), "{body}");
    assert!(!body.contains("metric_name_1"));

    let (_, _, body) = get(&app, "/metrics").await;
    assert!(!body.contains("hotprom_"));
}

#[tokio::test]
async fn default_metrics_route_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = cfg(dir.path());
    c.server.default_metrics = false;
    let app = build_router(AppState::new(c).unwrap());

    let (status, _, body) = get(&app, "/default-metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Server started at "), "{body}");
}

#[tokio::test]
async fn unmatched_path_reports_increasing_uptime() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(cfg(dir.path())).unwrap();
    let app = build_router(state.clone());

    let (status, _, first) = get(&app, "/anything").await;
    assert_eq!(status, StatusCode::OK);
    assert!(first.starts_with(&format!("Server started at {},", state.started_at_ms())), "{first}");

    tokio::time::sleep(Duration::from_millis(20)).await;
    let (_, _, second) = get(&app, "/").await;
    assert!(uptime(&second) > uptime(&first), "{first} / {second}");
}
