//! Refresh coordinator.
//!
//! A cycle snapshots the plugin table, runs every unit against the shared
//! registry (sequentially, each bounded by the plugin timeout), renders the
//! registry, and publishes the text into the serving cache. One slot guards
//! the whole cycle: at most one cycle runs at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use hotprom_core::error::ExporterError;
use hotprom_core::{Exposition, MetricRegistry};

use crate::obs::metrics::{
    ExporterMetrics, OUTCOME_COMPLETED, OUTCOME_JOINED, OUTCOME_RENDER_FAILED, OUTCOME_SKIPPED,
};
use crate::plugin::PluginTable;
use crate::refresh::cache::ServingCache;

/// Single slot held for the length of a cycle. Deregistration takes it too,
/// so a unit dropped from the table cannot re-register metrics afterwards.
pub type RefreshSlot = Arc<Mutex<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Cache republished.
    Completed { ran: usize, failed: usize },
    /// Units ran but rendering failed; the previous snapshot is still served.
    RenderFailed { ran: usize, failed: usize, error: String },
    /// Another cycle was running; nothing done.
    Skipped,
    /// Waited for the cycle that was running and reused its result.
    Joined,
}

pub struct RefreshCoordinator {
    table: Arc<PluginTable>,
    registry: Arc<MetricRegistry>,
    renderer: Arc<dyn Exposition>,
    cache: Arc<ServingCache>,
    metrics: Arc<ExporterMetrics>,
    timeout: Duration,
    in_flight: RefreshSlot,
}

impl RefreshCoordinator {
    pub fn new(
        table: Arc<PluginTable>,
        registry: Arc<MetricRegistry>,
        renderer: Arc<dyn Exposition>,
        cache: Arc<ServingCache>,
        metrics: Arc<ExporterMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            table,
            registry,
            renderer,
            cache,
            metrics,
            timeout,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Shared handle on the cycle slot.
    pub fn slot(&self) -> RefreshSlot {
        Arc::clone(&self.in_flight)
    }

    /// Run a cycle unless one is already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Ok(_slot) = self.in_flight.try_lock() else {
            tracing::debug!("refresh already in progress; skipping");
            self.metrics.refresh_total.with_label_values(&[OUTCOME_SKIPPED]).inc();
            return RefreshOutcome::Skipped;
        };
        self.run_cycle().await
    }

    /// Run a cycle, or wait for the one in flight to finish.
    pub async fn refresh_or_join(&self) -> RefreshOutcome {
        match self.in_flight.try_lock() {
            Ok(_slot) => self.run_cycle().await,
            Err(_) => {
                let _slot = self.in_flight.lock().await;
                self.metrics.refresh_total.with_label_values(&[OUTCOME_JOINED]).inc();
                RefreshOutcome::Joined
            }
        }
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        let started = Instant::now();
        let units = self.table.snapshot();
        let ran = units.len();
        let mut failed = 0;

        for unit in &units {
            let id = unit.id();
            let res = match tokio::time::timeout(self.timeout, unit.apply(Arc::clone(&self.registry))).await {
                Ok(res) => res,
                Err(_) => Err(ExporterError::execution(
                    id,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                )),
            };
            if let Err(e) = res {
                failed += 1;
                let name = id.name();
                self.metrics.plugin_failures.with_label_values(&[name.as_str()]).inc();
                tracing::warn!(plugin = %id, error = %e, "plugin failed during refresh");
            }
        }

        let outcome = match self.renderer.render() {
            Ok(text) => {
                let snap = self.cache.publish(text);
                self.metrics.refresh_total.with_label_values(&[OUTCOME_COMPLETED]).inc();
                tracing::debug!(ran, failed, generation = snap.generation, "metrics cache refreshed");
                RefreshOutcome::Completed { ran, failed }
            }
            Err(e) => {
                self.metrics.refresh_total.with_label_values(&[OUTCOME_RENDER_FAILED]).inc();
                tracing::error!(error = %e, "render failed; keeping previous snapshot");
                RefreshOutcome::RenderFailed {
                    ran,
                    failed,
                    error: e.to_string(),
                }
            }
        };
        self.metrics
            .refresh_duration
            .observe(started.elapsed().as_secs_f64());
        outcome
    }

    /// Refresh every `every` in the background. The first tick is skipped:
    /// startup already ran the initial cycle.
    pub fn spawn_interval(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
