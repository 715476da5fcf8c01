//! Interval-driven re-fetch of watched resources.
//!
//! Each watched resource gets its own polling task. A tick marks the resource
//! stale and re-fetches it unless a fetch for the same resource is already in
//! flight anywhere in the coordinator, in which case the tick is skipped.
//! Manual refreshes and cache invalidations run an immediate out-of-band tick.
//! Stopping a watch aborts its pending fetch and guarantees no later tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::cache::{ResourceKey, SnapshotCache, StoreOutcome};
use crate::api::{ApiError, CampaignApi};
use crate::config::SyncConfig;
use crate::session::Session;
use crate::types::{CampaignId, CampaignStatus};
use crate::workflow::LifecycleEvent;

/// Published by watchers after each fetch
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Refreshed {
        key: ResourceKey,
    },
    /// Consecutive detail snapshots disagree on status
    StatusChanged {
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
        /// Set when the change was a server-side lifecycle advance
        lifecycle: Option<LifecycleEvent>,
    },
    FetchFailed {
        key: ResourceKey,
        error: ApiError,
    },
}

/// Counters shared by every watcher of a coordinator
#[derive(Debug, Default)]
pub struct SyncStats {
    ticks: AtomicU64,
    skipped: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

impl SyncStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a fetch was already in flight
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

type InFlight = Arc<Mutex<HashSet<ResourceKey>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashSet<ResourceKey>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to fetch one resource; released on drop, including abort
struct FetchClaim {
    key: ResourceKey,
    in_flight: InFlight,
    released: broadcast::Sender<ResourceKey>,
}

impl FetchClaim {
    fn acquire(
        in_flight: &InFlight,
        released: &broadcast::Sender<ResourceKey>,
        key: &ResourceKey,
    ) -> Option<Self> {
        if lock(in_flight).insert(key.clone()) {
            Some(Self {
                key: key.clone(),
                in_flight: in_flight.clone(),
                released: released.clone(),
            })
        } else {
            None
        }
    }
}

impl Drop for FetchClaim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
        let _ = self.released.send(self.key.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickSource {
    Interval,
    Manual,
    Invalidated,
}

/// What a completed fetch observed
enum Fetched {
    Detail {
        id: CampaignId,
        status: CampaignStatus,
        outcome: StoreOutcome,
    },
    List,
}

/// Coordinates polling for one viewer session
#[derive(Clone)]
pub struct SyncCoordinator {
    api: Arc<dyn CampaignApi>,
    cache: Arc<SnapshotCache>,
    session: Session,
    config: SyncConfig,
    in_flight: InFlight,
    /// Announces each key whose fetch claim was dropped
    released: broadcast::Sender<ResourceKey>,
    stats: Arc<SyncStats>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    pub fn new(
        api: Arc<dyn CampaignApi>,
        cache: Arc<SnapshotCache>,
        session: Session,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(128);
        let (released, _) = broadcast::channel(64);
        Self {
            api,
            cache,
            session,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            released,
            stats: Arc::new(SyncStats::default()),
            events,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_in_flight(&self, key: &ResourceKey) -> bool {
        lock(&self.in_flight).contains(key)
    }

    /// Polling period for a resource
    pub fn interval_for(&self, key: &ResourceKey) -> Duration {
        match key {
            ResourceKey::Detail(_) => self.config.detail_interval(),
            ResourceKey::List(_) => self.config.list_interval(),
        }
    }

    /// Start polling `key`; the first tick fires immediately
    pub fn watch(&self, key: ResourceKey) -> WatchHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        info!(
            resource = %key,
            user = %self.session.user().username,
            period_secs = self.interval_for(&key).as_secs(),
            "Starting watch"
        );

        let watcher = Watcher {
            coordinator: self.clone(),
            key: key.clone(),
            last_status: None,
            rerun: false,
        };
        let task = tokio::spawn(watcher.run(shutdown_rx, refresh_rx));

        WatchHandle {
            key,
            shutdown: shutdown_tx,
            refresh: refresh_tx,
            task: Some(task),
        }
    }

    /// One fetch-and-store of `key`, bypassing the polling loop
    #[instrument(skip(self), fields(resource = %key))]
    pub async fn refresh_now(&self, key: &ResourceKey) -> Result<bool, ApiError> {
        let Some(claim) = FetchClaim::acquire(&self.in_flight, &self.released, key) else {
            debug!("Fetch already in flight");
            return Ok(false);
        };
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);
        fetch(self.api.clone(), self.cache.clone(), claim).await?;
        Ok(true)
    }
}

async fn fetch(
    api: Arc<dyn CampaignApi>,
    cache: Arc<SnapshotCache>,
    claim: FetchClaim,
) -> Result<Fetched, ApiError> {
    cache.mark_stale(&claim.key).await;
    match &claim.key {
        ResourceKey::Detail(id) => {
            let campaign = api.fetch_campaign(*id).await?;
            let status = campaign.status;
            let outcome = cache.store_detail(campaign).await;
            Ok(Fetched::Detail {
                id: *id,
                status,
                outcome,
            })
        }
        ResourceKey::List(query) => {
            let page = api.list_campaigns(query).await?;
            cache.store_list(query.clone(), page).await;
            Ok(Fetched::List)
        }
    }
}

struct Watcher {
    coordinator: SyncCoordinator,
    key: ResourceKey,
    /// Last status this watcher observed
    last_status: Option<CampaignStatus>,
    /// An out-of-band tick was skipped and is owed once the in-flight fetch lands
    rerun: bool,
}

impl Watcher {
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>, mut refresh_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.coordinator.interval_for(&self.key));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut invalidations = self.coordinator.cache.subscribe();
        let mut releases = self.coordinator.released.subscribe();
        let mut fetches: JoinSet<Result<Fetched, ApiError>> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(resource = %self.key, "Watch stopped");
                    break;
                }
                Some(joined) = fetches.join_next() => {
                    match joined {
                        Ok(result) => self.on_fetched(result),
                        Err(e) if e.is_panic() => warn!(resource = %self.key, "Fetch task panicked"),
                        Err(_) => {}
                    }
                    if std::mem::take(&mut self.rerun) {
                        self.tick(&mut fetches, TickSource::Invalidated);
                    }
                }
                // Another watcher's fetch of this key finished; run the owed tick
                received = releases.recv() => {
                    let ours = match received {
                        Ok(key) => key == self.key,
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => false,
                    };
                    if ours && fetches.is_empty() && std::mem::take(&mut self.rerun) {
                        self.tick(&mut fetches, TickSource::Invalidated);
                    }
                }
                Some(()) = refresh_rx.recv() => {
                    self.tick(&mut fetches, TickSource::Manual);
                }
                received = invalidations.recv() => match received {
                    Ok(invalidation) if invalidation.affects(&self.key) => {
                        self.tick(&mut fetches, TickSource::Invalidated);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(resource = %self.key, missed, "Invalidations lagged, refetching");
                        self.tick(&mut fetches, TickSource::Invalidated);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = interval.tick() => {
                    self.tick(&mut fetches, TickSource::Interval);
                }
            }
        }

        fetches.abort_all();
    }

    fn tick(&mut self, fetches: &mut JoinSet<Result<Fetched, ApiError>>, source: TickSource) {
        let coordinator = &self.coordinator;
        coordinator.stats.ticks.fetch_add(1, Ordering::SeqCst);

        let Some(claim) =
            FetchClaim::acquire(&coordinator.in_flight, &coordinator.released, &self.key)
        else {
            coordinator.stats.skipped.fetch_add(1, Ordering::SeqCst);
            debug!(resource = %self.key, ?source, "Fetch in flight, skipping tick");
            if source != TickSource::Interval {
                self.rerun = true;
            }
            return;
        };

        debug!(resource = %self.key, ?source, "Fetching");
        coordinator.stats.fetches.fetch_add(1, Ordering::SeqCst);
        fetches.spawn(fetch(
            coordinator.api.clone(),
            coordinator.cache.clone(),
            claim,
        ));
    }

    fn on_fetched(&mut self, result: Result<Fetched, ApiError>) {
        let coordinator = &self.coordinator;
        match result {
            Ok(Fetched::Detail { id, status, outcome }) => {
                if outcome == StoreOutcome::Discarded {
                    debug!(campaign = %id, "Fetched snapshot older than cache");
                } else if let Some(previous) = self.last_status.replace(status) {
                    if previous != status {
                        let lifecycle = LifecycleEvent::from_edge(previous, status);
                        info!(campaign = %id, from = %previous, to = %status, "Status changed");
                        let _ = coordinator.events.send(SyncEvent::StatusChanged {
                            id,
                            from: previous,
                            to: status,
                            lifecycle,
                        });
                    }
                }
                let _ = coordinator.events.send(SyncEvent::Refreshed {
                    key: self.key.clone(),
                });
            }
            Ok(Fetched::List) => {
                let _ = coordinator.events.send(SyncEvent::Refreshed {
                    key: self.key.clone(),
                });
            }
            Err(error) => {
                coordinator.stats.failures.fetch_add(1, Ordering::SeqCst);
                warn!(resource = %self.key, error = %error, "Fetch failed");
                let _ = coordinator.events.send(SyncEvent::FetchFailed {
                    key: self.key.clone(),
                    error,
                });
            }
        }
    }
}

/// Handle to a running watch; dropping it aborts the polling task
pub struct WatchHandle {
    key: ResourceKey,
    shutdown: mpsc::Sender<()>,
    refresh: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Request an immediate out-of-band tick; coalesces with a pending request
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(()).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryAuthority;
    use crate::session::{Role, SessionUser};
    use crate::types::CampaignQuery;

    fn user() -> SessionUser {
        SessionUser {
            id: 1,
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            brands: Vec::new(),
        }
    }

    fn coordinator(authority: &InMemoryAuthority) -> SyncCoordinator {
        let api = authority.connect(user());
        let session = api.session().clone();
        SyncCoordinator::new(
            Arc::new(api),
            Arc::new(SnapshotCache::new()),
            session,
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_refresh_now_stores_snapshot() {
        let authority = InMemoryAuthority::new();
        let campaign = authority.create_draft(&user(), None);
        let coordinator = coordinator(&authority);
        let key = ResourceKey::Detail(campaign.id);

        assert!(coordinator.refresh_now(&key).await.unwrap());
        assert!(!coordinator.cache().is_stale(&key).await);
        assert!(!coordinator.is_in_flight(&key));
        assert_eq!(coordinator.stats().fetches(), 1);
    }

    #[tokio::test]
    async fn test_refresh_now_reports_not_found() {
        let authority = InMemoryAuthority::new();
        let coordinator = coordinator(&authority);
        let key = ResourceKey::Detail(uuid::Uuid::new_v4());

        let err = coordinator.refresh_now(&key).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!coordinator.is_in_flight(&key));
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        let key = ResourceKey::List(CampaignQuery::approval_queue());

        let (released, mut releases) = broadcast::channel(4);

        let claim = FetchClaim::acquire(&in_flight, &released, &key).unwrap();
        assert!(FetchClaim::acquire(&in_flight, &released, &key).is_none());
        drop(claim);
        assert_eq!(releases.try_recv().unwrap(), key);
        assert!(FetchClaim::acquire(&in_flight, &released, &key).is_some());
    }

    #[tokio::test]
    async fn test_intervals_by_resource() {
        let authority = InMemoryAuthority::new();
        let coordinator = coordinator(&authority);
        assert_eq!(
            coordinator.interval_for(&ResourceKey::Detail(uuid::Uuid::nil())),
            Duration::from_secs(10)
        );
        assert_eq!(
            coordinator.interval_for(&ResourceKey::List(CampaignQuery::default())),
            Duration::from_secs(15)
        );
    }
}
