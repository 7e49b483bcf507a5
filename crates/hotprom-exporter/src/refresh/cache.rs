use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;

/// One published render.
#[derive(Debug)]
pub struct Snapshot {
    pub text: String,
    pub last_updated: SystemTime,
    /// 1 for the first publish, then +1 per publish.
    pub generation: u64,
}

impl Snapshot {
    pub fn last_updated_ms(&self) -> u128 {
        self.last_updated
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}

/// Last-good exposition text.
///
/// Backed by a `watch` channel holding an `Arc<Snapshot>`: publishing swaps
/// the whole value, so a reader gets either the old or the new snapshot and
/// never waits on a refresh. Empty until the first successful refresh.
pub struct ServingCache {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Default for ServingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn read(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, text: String) -> Arc<Snapshot> {
        let generation = self.read().map(|s| s.generation + 1).unwrap_or(1);
        let snap = Arc::new(Snapshot {
            text,
            last_updated: SystemTime::now(),
            generation,
        });
        self.tx.send_replace(Some(Arc::clone(&snap)));
        snap
    }
}
