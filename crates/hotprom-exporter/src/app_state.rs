//! Shared application state for the exporter.
//!
//! Owns the plugin registry, table, loader, refresh coordinator, and serving
//! cache. Request handlers only ever read the cache (or ask the coordinator
//! for a cycle); they never touch the registry or the table directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use hotprom_core::error::Result;
use hotprom_core::{Exposition, MetricRegistry};

use crate::config::{ExporterConfig, RefreshPolicy};
use crate::obs::ExporterMetrics;
use crate::plugin::{DirectoryWatcher, PluginLoader, PluginTable};
use crate::refresh::{RefreshCoordinator, RefreshOutcome, ServingCache};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ExporterConfig,
    loader: Arc<PluginLoader>,
    coordinator: Arc<RefreshCoordinator>,
    cache: Arc<ServingCache>,
    obs: Arc<ExporterMetrics>,
    started_at: SystemTime,
    started: Instant,
}

impl AppState {
    /// Build application state with the plugin registry as its own renderer.
    pub fn new(cfg: ExporterConfig) -> Result<Self> {
        let registry = Arc::new(MetricRegistry::new());
        let renderer: Arc<dyn Exposition> = registry.clone();
        Self::with_renderer(cfg, registry, renderer)
    }

    /// Build application state with a separate renderer for the cache.
    pub fn with_renderer(
        cfg: ExporterConfig,
        registry: Arc<MetricRegistry>,
        renderer: Arc<dyn Exposition>,
    ) -> Result<Self> {
        let obs = Arc::new(ExporterMetrics::new()?);
        let table = Arc::new(PluginTable::new());
        let cache = Arc::new(ServingCache::new());

        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&table),
            Arc::clone(&registry),
            renderer,
            Arc::clone(&cache),
            Arc::clone(&obs),
            cfg.plugins.timeout(),
        ));
        let loader = Arc::new(PluginLoader::new(
            &cfg.plugins,
            table,
            registry,
            Arc::clone(&obs),
            coordinator.slot(),
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                loader,
                coordinator,
                cache,
                obs,
                started_at: SystemTime::now(),
                started: Instant::now(),
            }),
        })
    }

    /// Startup sequence: the long-lived watcher, the initial scan, the
    /// first refresh, and (for the interval policy) the refresh ticker.
    ///
    /// The watcher goes first and scans again once its watch is established,
    /// so a file written while startup runs is not missed. An unreadable
    /// plugin directory is logged, not fatal; the watcher keeps retrying and
    /// loads plugins once the directory appears.
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        let dir = self.plugin_dir().await;

        let mut tasks = vec![DirectoryWatcher::new(
            dir.clone(),
            Arc::clone(&self.inner.loader),
            self.inner.cfg.plugins.watch_retry(),
        )
        .spawn()];

        if let Err(e) = self.inner.loader.load_all(&dir).await {
            tracing::error!(error = %e, kind = e.kind().as_str(), "initial plugin scan failed");
        }
        match self.inner.coordinator.refresh().await {
            RefreshOutcome::Completed { ran, failed } => {
                tracing::info!(ran, failed, "initial refresh complete")
            }
            other => tracing::warn!(outcome = ?other, "initial refresh did not publish"),
        }

        if self.inner.cfg.refresh.policy == RefreshPolicy::Interval {
            tasks.push(
                Arc::clone(&self.inner.coordinator).spawn_interval(self.inner.cfg.refresh.interval()),
            );
        }
        tasks
    }

    /// Plugin directory, canonicalized when it exists so scan and watch
    /// paths agree on identity.
    async fn plugin_dir(&self) -> PathBuf {
        let dir = &self.inner.cfg.plugins.dir;
        tokio::fs::canonicalize(dir).await.unwrap_or_else(|_| dir.clone())
    }

    pub fn cfg(&self) -> &ExporterConfig {
        &self.inner.cfg
    }

    pub fn loader(&self) -> Arc<PluginLoader> {
        Arc::clone(&self.inner.loader)
    }

    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.inner.coordinator)
    }

    pub fn cache(&self) -> Arc<ServingCache> {
        Arc::clone(&self.inner.cache)
    }

    pub fn obs(&self) -> Arc<ExporterMetrics> {
        Arc::clone(&self.inner.obs)
    }

    /// Process start, milliseconds since the Unix epoch.
    pub fn started_at_ms(&self) -> u128 {
        self.inner
            .started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    pub fn uptime_ms(&self) -> u128 {
        self.inner.started.elapsed().as_millis()
    }
}
