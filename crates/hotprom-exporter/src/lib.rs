//! hotprom exporter library entry.
//!
//! Wires config, script plugins, the plugin table and loader, the directory
//! watcher, the refresh coordinator, and the serving cache into a Prometheus
//! scrape endpoint. Consumed by the binary (`main.rs`) and integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod plugin;
pub mod refresh;
pub mod router;
