//! Exporter config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use hotprom_core::error::{ExporterError, Result};

pub use schema::{
    ExporterConfig, OnRemove, PluginsSection, RefreshPolicy, RefreshSection, ServerSection,
};

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "HOTPROM_CONFIG";
/// Config file used when `HOTPROM_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "hotprom.yaml";

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ExporterError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg: ExporterConfig = serde_yaml::from_str(s)
        .map_err(|e| ExporterError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve config for the process.
///
/// An explicitly named file must exist; the default file is optional and its
/// absence means built-in defaults. `PORT` overrides `server.port`.
pub fn load_from_env() -> Result<ExporterConfig> {
    let mut cfg = match std::env::var(CONFIG_ENV) {
        Ok(path) => load_from_file(&path)?,
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => load_from_file(DEFAULT_CONFIG_PATH)?,
        Err(_) => ExporterConfig::default(),
    };
    if let Ok(port) = std::env::var("PORT") {
        cfg.apply_port_override(&port)?;
    }
    Ok(cfg)
}
