//! Plugin loader: path -> validated unit -> plugin table.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hotprom_core::error::{ExporterError, Result};
use hotprom_core::{MetricProvider, MetricRegistry, PluginId};

use crate::config::{OnRemove, PluginsSection};
use crate::obs::ExporterMetrics;
use crate::plugin::script::ScriptProvider;
use crate::plugin::table::PluginTable;
use crate::refresh::RefreshSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Unit stored; `replaced` is true when an older unit was swapped out.
    Loaded { replaced: bool },
    /// Not a plugin file (extension mismatch).
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Unit kept; its metrics stay at their last values.
    Retained,
    /// Unit dropped and `metrics` registrations removed.
    Deregistered { metrics: usize },
    /// Nothing registered under that path.
    Unknown,
}

pub struct PluginLoader {
    table: Arc<PluginTable>,
    registry: Arc<MetricRegistry>,
    metrics: Arc<ExporterMetrics>,
    extension: String,
    timeout: Duration,
    on_remove: OnRemove,
    slot: RefreshSlot,
}

impl PluginLoader {
    pub fn new(
        cfg: &PluginsSection,
        table: Arc<PluginTable>,
        registry: Arc<MetricRegistry>,
        metrics: Arc<ExporterMetrics>,
        slot: RefreshSlot,
    ) -> Self {
        Self {
            table,
            registry,
            metrics,
            extension: cfg.extension.clone(),
            timeout: cfg.timeout(),
            on_remove: cfg.on_remove,
            slot,
        }
    }

    pub fn table(&self) -> Arc<PluginTable> {
        Arc::clone(&self.table)
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == OsStr::new(&self.extension))
    }

    /// Load (or reload) the plugin at `path`.
    ///
    /// On failure the table is left untouched, so a previously good unit
    /// under the same identity keeps running.
    pub async fn load(&self, path: &Path) -> Result<LoadOutcome> {
        if !self.is_eligible(path) {
            tracing::trace!(path = %path.display(), "not a plugin file; ignored");
            return Ok(LoadOutcome::Ignored);
        }

        let id = PluginId::new(path);
        match self.construct(&id).await {
            Ok(unit) => {
                let replaced = self.install(Arc::new(unit));
                self.metrics.plugin_loads.with_label_values(&["loaded"]).inc();
                tracing::info!(plugin = %id, replaced, "loaded plugin");
                Ok(LoadOutcome::Loaded { replaced })
            }
            Err(e) => {
                self.metrics.plugin_loads.with_label_values(&["failed"]).inc();
                tracing::error!(
                    plugin = %id,
                    error = %e,
                    kept_previous = self.table.contains(&id),
                    "plugin load failed"
                );
                Err(e)
            }
        }
    }

    async fn construct(&self, id: &PluginId) -> Result<ScriptProvider> {
        let source = tokio::fs::read_to_string(id.path())
            .await
            .map_err(|e| ExporterError::load(id, format!("read failed: {e}")))?;

        let owned = id.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || ScriptProvider::compile(owned, &source, timeout))
            .await
            .map_err(|e| ExporterError::load(id, format!("worker failed: {e}")))?
    }

    /// Store a ready unit (script or native). Returns true when it replaced one.
    pub fn install(&self, unit: Arc<dyn MetricProvider>) -> bool {
        let replaced = self.table.upsert(unit).is_some();
        self.metrics.plugins_loaded.set(self.table.len() as i64);
        replaced
    }

    /// Load every eligible file in `dir`, in name order. Individual failures
    /// are logged and skipped; only an unreadable directory is an error.
    pub async fn load_all(&self, dir: &Path) -> Result<usize> {
        let dir_err = |e: std::io::Error| ExporterError::DirectoryAccess {
            path: dir.display().to_string(),
            reason: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_err)? {
            paths.push(entry.path());
        }
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            if let Ok(LoadOutcome::Loaded { .. }) = self.load(&path).await {
                loaded += 1;
            }
        }
        tracing::info!(dir = %dir.display(), loaded, total = self.table.len(), "plugin scan finished");
        Ok(loaded)
    }

    /// Handle a vanished plugin file according to the removal policy.
    ///
    /// Deregistration waits for an in-flight refresh to finish: that cycle's
    /// table snapshot may still hold the unit.
    pub async fn remove(&self, path: &Path) -> RemoveOutcome {
        let id = PluginId::new(path);
        if !self.table.contains(&id) {
            return RemoveOutcome::Unknown;
        }

        match self.on_remove {
            OnRemove::Retain => {
                tracing::info!(plugin = %id, "plugin file removed; keeping last loaded unit");
                RemoveOutcome::Retained
            }
            OnRemove::Deregister => {
                let _slot = self.slot.lock().await;
                if self.table.remove(&id).is_none() {
                    return RemoveOutcome::Unknown;
                }
                let metrics = self.registry.unregister_owned_by(&id);
                self.metrics.plugins_loaded.set(self.table.len() as i64);
                tracing::info!(plugin = %id, metrics, "plugin file removed; unit and metrics dropped");
                RemoveOutcome::Deregistered { metrics }
            }
        }
    }
}
