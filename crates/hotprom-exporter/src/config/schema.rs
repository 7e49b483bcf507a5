use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use hotprom_core::error::{ExporterError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub plugins: PluginsSection,

    #[serde(default)]
    pub refresh: RefreshSection,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            plugins: PluginsSection::default(),
            refresh: RefreshSection::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ExporterError::UnsupportedVersion);
        }
        self.server.validate()?;
        self.plugins.validate()?;
        self.refresh.validate()?;
        Ok(())
    }

    pub fn apply_port_override(&mut self, raw: &str) -> Result<()> {
        let port: u16 = raw
            .trim()
            .parse()
            .map_err(|_| ExporterError::Config(format!("PORT must be a port number, got {raw:?}")))?;
        self.server.port = port;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .listen
            .parse()
            .map_err(|_| ExporterError::Config("server.listen must be an IP address".into()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve `/default-metrics` (process + exporter self metrics).
    #[serde(default = "default_true")]
    pub default_metrics: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            default_metrics: true,
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<IpAddr>().is_err() {
            return Err(ExporterError::Config(
                "server.listen must be an IP address".into(),
            ));
        }
        Ok(())
    }
}

/// What happens to a plugin when its file disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRemove {
    /// Keep the last loaded unit; its metrics stay frozen.
    #[default]
    Retain,
    /// Drop the unit and unregister the metrics it owns.
    Deregister,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginsSection {
    #[serde(default = "default_plugin_dir")]
    pub dir: PathBuf,

    /// File extension (without dot) of plugin scripts.
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub on_remove: OnRemove,

    #[serde(default = "default_watch_retry_ms")]
    pub watch_retry_ms: u64,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            dir: default_plugin_dir(),
            extension: default_extension(),
            timeout_ms: default_timeout_ms(),
            on_remove: OnRemove::default(),
            watch_retry_ms: default_watch_retry_ms(),
        }
    }
}

impl PluginsSection {
    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(ExporterError::Config(
                "plugins.extension must be a single non-empty extension without dots".into(),
            ));
        }
        if !(100..=300_000).contains(&self.timeout_ms) {
            return Err(ExporterError::Config(
                "plugins.timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if !(100..=600_000).contains(&self.watch_retry_ms) {
            return Err(ExporterError::Config(
                "plugins.watch_retry_ms must be between 100 and 600000".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn watch_retry(&self) -> Duration {
        Duration::from_millis(self.watch_retry_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Background refresh every `interval_ms`; scrapes read the cache.
    #[default]
    Interval,
    /// Every scrape runs (or joins) a refresh before reading the cache.
    OnRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshSection {
    #[serde(default)]
    pub policy: RefreshPolicy,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            policy: RefreshPolicy::default(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl RefreshSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=3_600_000).contains(&self.interval_ms) {
            return Err(ExporterError::Config(
                "refresh.interval_ms must be between 100 and 3600000".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_true() -> bool {
    true
}
fn default_plugin_dir() -> PathBuf {
    PathBuf::from("./metrics")
}
fn default_extension() -> String {
    "rhai".into()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_watch_retry_ms() -> u64 {
    5000
}
fn default_interval_ms() -> u64 {
    10000
}
