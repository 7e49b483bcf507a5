use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
};

use hotprom_core::error::Result;
use hotprom_core::registry::encode_text;

/// Refresh-cycle outcome label values.
pub const OUTCOME_COMPLETED: &str = "completed";
pub const OUTCOME_RENDER_FAILED: &str = "render_failed";
pub const OUTCOME_SKIPPED: &str = "skipped";
pub const OUTCOME_JOINED: &str = "joined";

pub struct ExporterMetrics {
    registry: Registry,
    pub refresh_total: IntCounterVec,
    pub refresh_duration: Histogram,
    pub plugin_failures: IntCounterVec,
    pub plugin_loads: IntCounterVec,
    pub plugins_loaded: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let refresh_total = IntCounterVec::new(
            Opts::new("hotprom_refresh_total", "Refresh cycles by outcome"),
            &["outcome"],
        )?;
        let refresh_duration = Histogram::with_opts(HistogramOpts::new(
            "hotprom_refresh_duration_seconds",
            "Wall time of refresh cycles that ran, published or render-failed",
        ))?;
        let plugin_failures = IntCounterVec::new(
            Opts::new("hotprom_plugin_failures_total", "Plugin errors or timeouts during refresh"),
            &["plugin"],
        )?;
        let plugin_loads = IntCounterVec::new(
            Opts::new("hotprom_plugin_loads_total", "Plugin load attempts by result"),
            &["result"],
        )?;
        let plugins_loaded = IntGauge::new("hotprom_plugins_loaded", "Entries in the plugin table")?;

        registry.register(Box::new(refresh_total.clone()))?;
        registry.register(Box::new(refresh_duration.clone()))?;
        registry.register(Box::new(plugin_failures.clone()))?;
        registry.register(Box::new(plugin_loads.clone()))?;
        registry.register(Box::new(plugins_loaded.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            refresh_total,
            refresh_duration,
            plugin_failures,
            plugin_loads,
            plugins_loaded,
        })
    }

    pub fn render(&self) -> Result<String> {
        encode_text(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_own_families() {
        let m = ExporterMetrics::new().unwrap();
        m.refresh_total.with_label_values(&[OUTCOME_COMPLETED]).inc();
        m.plugins_loaded.set(2);

        let text = m.render().unwrap();
        assert!(text.contains("hotprom_refresh_total{outcome=\"completed\"} 1"), "{text}");
        assert!(text.contains("hotprom_plugins_loaded 2"), "{text}");
    }
}
