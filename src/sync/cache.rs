//! Per-viewer snapshot cache.
//!
//! Holds the last known detail snapshot of each campaign and the last page of
//! each list query, with a stale flag per entry. Invalidation is coarse: a
//! change to one campaign marks its detail entry and every list entry stale.
//! Snapshots older than the cached one (by `updated_at`) are discarded, so a
//! slow poll can never roll back a fresher transition response.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::types::{Campaign, CampaignId, CampaignQuery, CampaignSummary, Page};

/// Identity of a cached, watchable resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Detail(CampaignId),
    List(CampaignQuery),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Detail(id) => write!(f, "campaign {}", id),
            ResourceKey::List(query) => write!(f, "campaigns [{}]", query),
        }
    }
}

/// Broadcast when entries are invalidated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Detail(CampaignId),
    AllLists,
}

impl Invalidation {
    pub fn affects(&self, key: &ResourceKey) -> bool {
        match (self, key) {
            (Invalidation::Detail(id), ResourceKey::Detail(key_id)) => id == key_id,
            (Invalidation::AllLists, ResourceKey::List(_)) => true,
            _ => false,
        }
    }
}

/// Result of offering a snapshot to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Older than what is cached
    Discarded,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    stale: bool,
    fetched_at: DateTime<Utc>,
}

impl<T> Entry<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            stale: false,
            fetched_at: Utc::now(),
        }
    }
}

pub struct SnapshotCache {
    details: RwLock<HashMap<CampaignId, Entry<Campaign>>>,
    lists: RwLock<HashMap<CampaignQuery, Entry<Page<CampaignSummary>>>>,
    invalidations: broadcast::Sender<Invalidation>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(64);
        Self {
            details: RwLock::new(HashMap::new()),
            lists: RwLock::new(HashMap::new()),
            invalidations,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.invalidations.subscribe()
    }

    pub async fn detail(&self, id: CampaignId) -> Option<Campaign> {
        self.details.read().await.get(&id).map(|e| e.value.clone())
    }

    /// Cached detail unless it has been invalidated since it was stored
    pub async fn fresh_detail(&self, id: CampaignId) -> Option<Campaign> {
        self.details
            .read()
            .await
            .get(&id)
            .filter(|e| !e.stale)
            .map(|e| e.value.clone())
    }

    pub async fn list(&self, query: &CampaignQuery) -> Option<Page<CampaignSummary>> {
        self.lists.read().await.get(query).map(|e| e.value.clone())
    }

    /// When the entry was last stored
    pub async fn fetched_at(&self, key: &ResourceKey) -> Option<DateTime<Utc>> {
        match key {
            ResourceKey::Detail(id) => self.details.read().await.get(id).map(|e| e.fetched_at),
            ResourceKey::List(query) => self.lists.read().await.get(query).map(|e| e.fetched_at),
        }
    }

    /// Missing entries count as stale
    pub async fn is_stale(&self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::Detail(id) => self.details.read().await.get(id).map_or(true, |e| e.stale),
            ResourceKey::List(query) => self.lists.read().await.get(query).map_or(true, |e| e.stale),
        }
    }

    /// Store a detail snapshot unless a newer one is cached
    pub async fn store_detail(&self, campaign: Campaign) -> StoreOutcome {
        let mut details = self.details.write().await;
        if let Some(existing) = details.get_mut(&campaign.id) {
            if existing.value.updated_at > campaign.updated_at {
                debug!(
                    campaign = %campaign.id,
                    cached = %existing.value.updated_at,
                    offered = %campaign.updated_at,
                    "discarding older snapshot"
                );
                return StoreOutcome::Discarded;
            }
        }
        details.insert(campaign.id, Entry::fresh(campaign));
        StoreOutcome::Stored
    }

    pub async fn store_list(&self, query: CampaignQuery, page: Page<CampaignSummary>) {
        self.lists.write().await.insert(query, Entry::fresh(page));
    }

    /// Mark one entry stale without notifying watchers
    pub async fn mark_stale(&self, key: &ResourceKey) {
        match key {
            ResourceKey::Detail(id) => {
                if let Some(entry) = self.details.write().await.get_mut(id) {
                    entry.stale = true;
                }
            }
            ResourceKey::List(query) => {
                if let Some(entry) = self.lists.write().await.get_mut(query) {
                    entry.stale = true;
                }
            }
        }
    }

    /// Mark a campaign's detail entry stale and notify its watchers
    pub async fn invalidate_detail(&self, id: CampaignId) {
        self.mark_stale(&ResourceKey::Detail(id)).await;
        let _ = self.invalidations.send(Invalidation::Detail(id));
    }

    /// Mark every list entry stale and notify list watchers
    pub async fn invalidate_lists(&self) {
        for entry in self.lists.write().await.values_mut() {
            entry.stale = true;
        }
        let _ = self.invalidations.send(Invalidation::AllLists);
    }

    /// Coarse invalidation after a change to `id`
    pub async fn invalidate_campaign(&self, id: CampaignId) {
        self.invalidate_detail(id).await;
        self.invalidate_lists().await;
    }

    /// Forget a deleted campaign
    pub async fn remove(&self, id: CampaignId) {
        self.details.write().await.remove(&id);
        let _ = self.invalidations.send(Invalidation::Detail(id));
        self.invalidate_lists().await;
    }
}
