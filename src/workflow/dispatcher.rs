//! Executes workflow actions against the campaigns API.
//!
//! Every action is validated locally against the cached (or freshly fetched)
//! snapshot before anything is sent. Only one action per campaign may run at a
//! time within a dispatcher. Successful actions store the returned snapshot
//! and invalidate the campaign's detail entry plus every list entry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use super::action::{ActionKind, WorkflowAction};
use super::audit::AuditTrail;
use super::error::{ValidationError, WorkflowError};
use super::schedule::ScheduleWindow;
use super::transitions::{self, Transition};
use crate::api::{ApiError, CampaignApi};
use crate::session::Session;
use crate::sync::SnapshotCache;
use crate::types::{Campaign, CampaignId, CampaignPatch, CampaignStatus};

/// Result of a successful action
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Status changed; `campaign` is the server's snapshot after the move
    Transitioned {
        campaign: Campaign,
        edge: (CampaignStatus, CampaignStatus),
    },
    /// Fields edited, status unchanged
    Updated(Campaign),
    Deleted(CampaignId),
}

impl Dispatched {
    pub fn campaign(&self) -> Option<&Campaign> {
        match self {
            Dispatched::Transitioned { campaign, .. } | Dispatched::Updated(campaign) => {
                Some(campaign)
            }
            Dispatched::Deleted(_) => None,
        }
    }
}

type Running = Arc<Mutex<HashSet<CampaignId>>>;

fn lock(running: &Running) -> MutexGuard<'_, HashSet<CampaignId>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a campaign busy until dropped
struct ActionClaim {
    id: CampaignId,
    running: Running,
}

impl Drop for ActionClaim {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.id);
    }
}

/// Cached snapshot of `id`, re-fetched when absent or invalidated
pub(crate) async fn snapshot(
    api: &dyn CampaignApi,
    cache: &SnapshotCache,
    id: CampaignId,
) -> Result<Campaign, ApiError> {
    if let Some(campaign) = cache.fresh_detail(id).await {
        return Ok(campaign);
    }
    let campaign = api.fetch_campaign(id).await?;
    cache.store_detail(campaign.clone()).await;
    Ok(campaign)
}

/// Unwrap an action task; panics propagate, cancellation becomes `Interrupted`
fn joined(
    id: CampaignId,
    outcome: Result<Result<Dispatched, WorkflowError>, JoinError>,
) -> Result<Dispatched, WorkflowError> {
    match outcome {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            warn!(campaign = %id, error = %err, "Action task cancelled");
            Err(WorkflowError::Interrupted(id))
        }
    }
}

#[derive(Clone)]
pub struct WorkflowDispatcher {
    api: Arc<dyn CampaignApi>,
    session: Session,
    cache: Arc<SnapshotCache>,
    running: Running,
}

impl WorkflowDispatcher {
    pub fn new(api: Arc<dyn CampaignApi>, session: Session, cache: Arc<SnapshotCache>) -> Self {
        Self {
            api,
            session,
            cache,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Whether an action is currently running for `id`
    pub fn is_running(&self, id: CampaignId) -> bool {
        lock(&self.running).contains(&id)
    }

    /// Actions the session may trigger on the campaign right now
    pub async fn available_actions(&self, id: CampaignId) -> Result<Vec<ActionKind>, WorkflowError> {
        let campaign = snapshot(self.api.as_ref(), &self.cache, id).await?;
        let authority = self.session.authority_for(&campaign);
        Ok(transitions::available_actions(campaign.status, &authority))
    }

    /// Validate and run `action` on campaign `id`.
    ///
    /// The remote work runs on its own task, so dropping the returned future
    /// does not cancel a transition that has already started.
    pub async fn execute(
        &self,
        id: CampaignId,
        action: WorkflowAction,
    ) -> Result<Dispatched, WorkflowError> {
        let claim = self.claim(id)?;
        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.run(id, action).await;
            drop(claim);
            result
        });
        joined(id, task.await)
    }

    /// Retry only the `schedule/` POST after a `SchedulePartial` failure
    #[instrument(skip(self), fields(campaign = %id))]
    pub async fn complete_schedule(&self, id: CampaignId) -> Result<Dispatched, WorkflowError> {
        let _claim = self.claim(id)?;
        // The cache may predate the persisted dates
        let current = self.api.fetch_campaign(id).await?;
        self.cache.store_detail(current.clone()).await;

        let action = WorkflowAction::Schedule {
            start: current.scheduled_start,
            end: current.scheduled_end,
        };
        let transition = self.validate(&current, &action)?;
        self.post_transition(&current, &action, &transition).await
    }

    fn claim(&self, id: CampaignId) -> Result<ActionClaim, WorkflowError> {
        if !lock(&self.running).insert(id) {
            debug!(campaign = %id, "Action already running");
            return Err(WorkflowError::InFlight(id));
        }
        Ok(ActionClaim {
            id,
            running: self.running.clone(),
        })
    }

    fn validate(
        &self,
        current: &Campaign,
        action: &WorkflowAction,
    ) -> Result<Transition, ValidationError> {
        let authority = self.session.authority_for(current);
        transitions::validate(current.status, action, &authority)
    }

    #[instrument(skip(self, action), fields(campaign = %id, action = %action.kind()))]
    async fn run(&self, id: CampaignId, action: WorkflowAction) -> Result<Dispatched, WorkflowError> {
        let current = snapshot(self.api.as_ref(), &self.cache, id).await?;
        let transition = self.validate(&current, &action)?;

        match (&action, &transition) {
            (WorkflowAction::Edit(patch), _) => {
                let updated = match self.api.update_campaign(id, patch).await {
                    Ok(updated) => updated,
                    Err(err) => return Err(self.refused(id, current.status, err).await),
                };
                self.settle(updated.clone()).await;
                info!("Campaign updated");
                Ok(Dispatched::Updated(updated))
            }
            (WorkflowAction::Delete, _) => {
                if let Err(err) = self.api.delete_campaign(id).await {
                    return Err(self.refused(id, current.status, err).await);
                }
                self.cache.remove(id).await;
                info!("Campaign deleted");
                Ok(Dispatched::Deleted(id))
            }
            (
                _,
                Transition::Move {
                    window: Some(window),
                    ..
                },
            ) => {
                self.persist_window(&current, window).await?;
                self.post_transition(&current, &action, &transition)
                    .await
                    .map_err(|err| match err {
                        WorkflowError::Remote(source) => {
                            warn!(error = %source, "Schedule dates saved, transition failed");
                            WorkflowError::SchedulePartial {
                                window: *window,
                                source,
                            }
                        }
                        other => other,
                    })
            }
            _ => self.post_transition(&current, &action, &transition).await,
        }
    }

    /// First half of `schedule`: PATCH the window
    async fn persist_window(
        &self,
        current: &Campaign,
        window: &ScheduleWindow,
    ) -> Result<(), WorkflowError> {
        let patch = CampaignPatch {
            scheduled_start: Some(window.start()),
            scheduled_end: Some(window.end()),
            ..Default::default()
        };
        match self.api.update_campaign(current.id, &patch).await {
            Ok(updated) => {
                self.cache.store_detail(updated).await;
                Ok(())
            }
            Err(err) => Err(self.refused(current.id, current.status, err).await),
        }
    }

    async fn post_transition(
        &self,
        current: &Campaign,
        action: &WorkflowAction,
        transition: &Transition,
    ) -> Result<Dispatched, WorkflowError> {
        let Some(edge) = transition.edge() else {
            return Err(ValidationError::NotAllowed {
                action: action.kind(),
                status: current.status,
            }
            .into());
        };

        let comments = match action {
            WorkflowAction::Schedule { .. } => None,
            other => other.comments(),
        };
        let campaign = match self.api.transition(current.id, action.kind(), comments).await {
            Ok(campaign) => campaign,
            Err(err) => return Err(self.refused(current.id, current.status, err).await),
        };

        let (campaign, edge) = self.confirm_audit(campaign, edge, transition);
        self.settle(campaign.clone()).await;
        info!(from = %edge.0, to = %edge.1, "Campaign transitioned");
        Ok(Dispatched::Transitioned { campaign, edge })
    }

    /// Edge the server actually recorded, recording the expected step locally
    /// only when the response moved to the expected status without one
    fn confirm_audit(
        &self,
        mut campaign: Campaign,
        expected: (CampaignStatus, CampaignStatus),
        transition: &Transition,
    ) -> (Campaign, (CampaignStatus, CampaignStatus)) {
        let mut trail = match AuditTrail::from_server(&campaign.approval_history) {
            Ok(trail) => trail,
            Err(err) => {
                warn!(error = %err, "Unreadable approval history");
                let edge = (expected.0, campaign.status);
                return (campaign, edge);
            }
        };
        if trail.confirms(expected) {
            return (campaign, expected);
        }

        // A newest step ending at the current status is the server's record of this move
        if let Some(recorded) = trail
            .latest()
            .filter(|step| step.new_status == campaign.status)
            .map(|step| step.edge())
        {
            warn!(
                expected_from = %expected.0,
                actual_from = %recorded.0,
                "Campaign moved from a different status than the one validated"
            );
            return (campaign, recorded);
        }

        if campaign.status != expected.1 {
            warn!(
                expected = %expected.1,
                actual = %campaign.status,
                "Transition response disagrees with the edge taken"
            );
            let edge = (expected.0, campaign.status);
            return (campaign, edge);
        }

        let user = self.session.user();
        if let Some(mut step) = transition.audit_step(Some(user.id), Utc::now()) {
            debug!("Response omitted the approval step, recording it locally");
            step.approver_name = Some(user.username.clone());
            if trail.append(step).is_ok() {
                campaign.approval_history = trail.to_server_order();
            }
        }
        (campaign, expected)
    }

    /// Store the server's snapshot, then invalidate everything that may show it
    async fn settle(&self, campaign: Campaign) {
        let id = campaign.id;
        self.cache.store_detail(campaign).await;
        self.cache.invalidate_campaign(id).await;
    }

    /// Classify a server refusal; status refusals re-fetch to detect a conflict
    async fn refused(&self, id: CampaignId, expected: CampaignStatus, err: ApiError) -> WorkflowError {
        if !err.is_status_refusal() {
            return WorkflowError::Remote(err);
        }
        match self.api.fetch_campaign(id).await {
            Ok(latest) if latest.status != expected => {
                info!(
                    campaign = %id,
                    expected = %expected,
                    actual = %latest.status,
                    "Campaign changed underneath us"
                );
                self.cache.store_detail(latest.clone()).await;
                self.cache.invalidate_campaign(id).await;
                WorkflowError::Conflict {
                    expected,
                    actual: latest.status,
                    latest: Box::new(latest),
                }
            }
            Ok(_) => WorkflowError::Remote(err),
            Err(fetch_err) => {
                debug!(error = %fetch_err, "Re-fetch after refusal failed");
                WorkflowError::Remote(err)
            }
        }
    }
}
