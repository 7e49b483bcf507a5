//! Refresh cycles and the serving cache they publish into.

pub mod cache;
pub mod coordinator;

pub use cache::{ServingCache, Snapshot};
pub use coordinator::{RefreshCoordinator, RefreshOutcome, RefreshSlot};
