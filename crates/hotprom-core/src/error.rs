//! Shared error type across hotprom crates.

use thiserror::Error;

/// Stable error codes (used in logs and self-metric labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Plugin file could not be read, compiled, or validated.
    PluginLoad,
    /// Plugin failed or timed out during a refresh cycle.
    PluginExecution,
    /// Registry could not produce exposition text.
    Render,
    /// Plugin directory could not be read or watched.
    DirectoryAccess,
    /// Invalid process configuration.
    Config,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PluginLoad => "PLUGIN_LOAD",
            ErrorKind::PluginExecution => "PLUGIN_EXECUTION",
            ErrorKind::Render => "RENDER",
            ErrorKind::DirectoryAccess => "DIRECTORY_ACCESS",
            ErrorKind::Config => "CONFIG",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("plugin load failed ({plugin}): {reason}")]
    PluginLoad { plugin: String, reason: String },
    #[error("plugin execution failed ({plugin}): {reason}")]
    PluginExecution { plugin: String, reason: String },
    #[error("render failed: {0}")]
    Render(String),
    #[error("directory access failed ({path}): {reason}")]
    DirectoryAccess { path: String, reason: String },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl ExporterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExporterError::PluginLoad { .. } => ErrorKind::PluginLoad,
            ExporterError::PluginExecution { .. } => ErrorKind::PluginExecution,
            ExporterError::Render(_) => ErrorKind::Render,
            ExporterError::DirectoryAccess { .. } => ErrorKind::DirectoryAccess,
            ExporterError::Config(_) => ErrorKind::Config,
            ExporterError::UnsupportedVersion => ErrorKind::UnsupportedVersion,
            ExporterError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn load(plugin: impl ToString, reason: impl ToString) -> Self {
        ExporterError::PluginLoad {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn execution(plugin: impl ToString, reason: impl ToString) -> Self {
        ExporterError::PluginExecution {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(e: prometheus::Error) -> Self {
        ExporterError::Internal(format!("prometheus: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let e = ExporterError::load("a.rhai", "missing apply(registry)");
        assert_eq!(e.kind().as_str(), "PLUGIN_LOAD");
        assert_eq!(
            e.to_string(),
            "plugin load failed (a.rhai): missing apply(registry)"
        );
        assert_eq!(ExporterError::Render("x".into()).kind(), ErrorKind::Render);
    }
}
