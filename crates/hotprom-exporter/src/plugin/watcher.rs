//! Directory watcher: filesystem events -> loader.
//!
//! `notify` delivers events on its own thread; the callback only forwards
//! them into an unbounded channel drained by one long-lived tokio task, so the
//! task sleeps until something changes. Watch errors are logged and the
//! watch is re-established after `watch_retry` rather than ending the task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hotprom_core::error::{ExporterError, Result};

use crate::plugin::loader::PluginLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Map a raw notify event to plugin events (one per path). Access and
/// unclassified events yield nothing.
pub fn classify(event: &Event) -> Vec<PluginEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|p| PluginEvent {
            path: p.clone(),
            kind,
        })
        .collect()
}

/// Feed one event to the loader. A rename is resolved by looking at the
/// path: present means load, gone means removal.
pub async fn dispatch(loader: &PluginLoader, event: PluginEvent) {
    if !loader.is_eligible(&event.path) {
        return;
    }
    let gone = match event.kind {
        ChangeKind::Removed => true,
        ChangeKind::Renamed => !tokio::fs::try_exists(&event.path).await.unwrap_or(false),
        ChangeKind::Created | ChangeKind::Modified => false,
    };

    tracing::debug!(path = %event.path.display(), kind = ?event.kind, "plugin file event");
    if gone {
        loader.remove(&event.path).await;
    } else {
        // failures are logged by the loader; the watch continues
        let _ = loader.load(&event.path).await;
    }
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    loader: Arc<PluginLoader>,
    retry: Duration,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, loader: Arc<PluginLoader>, retry: Duration) -> Self {
        Self {
            dir: dir.into(),
            loader,
            retry,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Watch forever. The directory is scanned every time the watch is
    /// established, the first time included: files written before the
    /// subscription produce no event.
    pub async fn run(self) {
        loop {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let watcher = match subscribe(&self.dir, tx) {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, retry_ms = self.retry.as_millis() as u64, "plugin directory not watchable; retrying");
                    tokio::time::sleep(self.retry).await;
                    continue;
                }
            };
            tracing::info!(dir = %self.dir.display(), "watching plugin directory");

            if let Err(e) = self.loader.load_all(&self.dir).await {
                tracing::warn!(error = %e, "scan after watch failed");
            }

            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        if dir_removed(&self.dir, &event) {
                            tracing::warn!(dir = %self.dir.display(), "plugin directory removed");
                            break;
                        }
                        for ev in classify(&event) {
                            dispatch(&self.loader, ev).await;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "watch error; continuing"),
                }
            }

            drop(watcher);
            tokio::time::sleep(self.retry).await;
        }
    }
}

fn dir_removed(dir: &Path, event: &Event) -> bool {
    matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| p == dir)
}

fn subscribe(
    dir: &Path,
    tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let access_err = |e: notify::Error| ExporterError::DirectoryAccess {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })
    .map_err(access_err)?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(access_err)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn classify_maps_kinds() {
        let created = classify(&event(EventKind::Create(CreateKind::File), &["/m/a.rhai"]));
        assert_eq!(created[0].kind, ChangeKind::Created);

        let modified = classify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/m/a.rhai"],
        ));
        assert_eq!(modified[0].kind, ChangeKind::Modified);

        let removed = classify(&event(EventKind::Remove(RemoveKind::File), &["/m/a.rhai"]));
        assert_eq!(removed[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn rename_yields_both_paths() {
        let evs = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/m/old.rhai", "/m/new.rhai"],
        ));
        assert_eq!(evs.len(), 2);
        assert!(evs.iter().all(|e| e.kind == ChangeKind::Renamed));
        assert_eq!(evs[1].path, PathBuf::from("/m/new.rhai"));
    }

    #[test]
    fn access_is_ignored() {
        let evs = classify(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/m/a.rhai"],
        ));
        assert!(evs.is_empty());
    }

    #[test]
    fn dir_removal_is_detected() {
        let dir = Path::new("/m");
        assert!(dir_removed(dir, &event(EventKind::Remove(RemoveKind::Folder), &["/m"])));
        assert!(!dir_removed(dir, &event(EventKind::Remove(RemoveKind::File), &["/m/a.rhai"])));
    }
}
