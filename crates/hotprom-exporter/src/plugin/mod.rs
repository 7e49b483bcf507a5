//! Plugin lifecycle: script units, the plugin table, the loader, and the
//! directory watcher that drives reloads.

pub mod host;
pub mod loader;
pub mod script;
pub mod table;
pub mod watcher;

pub use loader::{LoadOutcome, PluginLoader, RemoveOutcome};
pub use script::ScriptProvider;
pub use table::PluginTable;
pub use watcher::DirectoryWatcher;
