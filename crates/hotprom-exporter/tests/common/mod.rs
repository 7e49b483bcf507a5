//! Shared fixtures for exporter integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hotprom_core::error::{ExporterError, Result};
use hotprom_core::{Exposition, MetricProvider, MetricRegistry, PluginId};
use hotprom_exporter::config::{ExporterConfig, OnRemove, RefreshPolicy};

pub fn cfg(dir: &Path) -> ExporterConfig {
    let mut cfg = ExporterConfig::default();
    cfg.plugins.dir = dir.to_path_buf();
    cfg.plugins.timeout_ms = 1000;
    cfg.plugins.watch_retry_ms = 200;
    cfg
}

pub fn cfg_with(dir: &Path, policy: RefreshPolicy, on_remove: OnRemove) -> ExporterConfig {
    let mut c = cfg(dir);
    c.refresh.policy = policy;
    c.plugins.on_remove = on_remove;
    c
}

/// Script setting one gauge to a fixed value.
pub fn gauge_script(name: &str, value: i64) -> String {
    format!(
        r#"
print("constructing {name}");

fn apply(registry) {{
    registry.gauge("{name}", "metric_help").set({value});
}}
"#
    )
}

pub fn write(dir: &Path, file: &str, body: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, body).unwrap();
    path
}

/// Renders the wrapped registry unless told to fail.
pub struct FlakyRenderer {
    pub registry: Arc<MetricRegistry>,
    pub fail: AtomicBool,
}

impl FlakyRenderer {
    pub fn new(registry: Arc<MetricRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            fail: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Exposition for FlakyRenderer {
    fn render(&self) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExporterError::Render("encoder exploded".into()));
        }
        self.registry.render()
    }
}

/// Native provider that always fails.
pub struct Failing(pub PluginId);

#[async_trait]
impl MetricProvider for Failing {
    fn id(&self) -> &PluginId {
        &self.0
    }
    async fn apply(&self, _registry: Arc<MetricRegistry>) -> Result<()> {
        Err(ExporterError::execution(&self.0, "upstream unavailable"))
    }
}

/// Native provider that sets a gauge after sleeping.
pub struct Slow {
    pub id: PluginId,
    pub delay: Duration,
    pub metric: &'static str,
}

#[async_trait]
impl MetricProvider for Slow {
    fn id(&self) -> &PluginId {
        &self.id
    }
    async fn apply(&self, registry: Arc<MetricRegistry>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        registry.gauge(&self.id, self.metric, "slow")?.set(1.0);
        Ok(())
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
