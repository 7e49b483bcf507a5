//! Plugin identity and the provider contract every plugin satisfies.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::registry::MetricRegistry;

/// Stable plugin identity: the plugin's file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(PathBuf);

impl PluginId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name only, for log lines and labels.
    pub fn name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for PluginId {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

/// A loaded plugin instance.
///
/// `apply` registers and/or updates metrics in the shared registry. It is
/// invoked once per refresh cycle; an `Err` is isolated to this provider and
/// never aborts the cycle.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    fn id(&self) -> &PluginId;
    async fn apply(&self, registry: Arc<MetricRegistry>) -> Result<()>;
}
