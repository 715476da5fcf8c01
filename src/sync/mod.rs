//! Read synchronization: per-viewer snapshot cache plus interval polling.

mod cache;
mod coordinator;

pub use cache::{Invalidation, ResourceKey, SnapshotCache, StoreOutcome};
pub use coordinator::{SyncCoordinator, SyncEvent, SyncStats, WatchHandle};
