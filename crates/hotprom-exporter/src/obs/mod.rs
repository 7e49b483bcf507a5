//! Exporter self-observability.
//!
//! The exporter's own counters live in a registry separate from the plugin
//! registry and are served on `/default-metrics`, next to the process
//! collector, so plugin output on `/metrics` stays exactly what plugins wrote.

pub mod metrics;

pub use metrics::ExporterMetrics;
