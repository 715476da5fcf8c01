//! In-process campaigns authority.
//!
//! `InMemoryAuthority` holds the single source of truth and enforces the same
//! rules as the REST service: status checks, reviewer roles, brand access,
//! newest-first history serialization. Each `InMemoryCampaignApi` is one
//! signed-in client of that authority, so races between sessions resolve the
//! way they do against the real server.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::{campaign_path, ApiError, CampaignApi};
use crate::session::{Authority, Session, SessionUser};
use crate::types::{
    AddRecipientsRequest, AddRecipientsResult, ApprovalStep, Campaign, CampaignId, CampaignPatch,
    CampaignQuery, CampaignStatus, CampaignSummary, ClearRecipientsResult, EmailPreview,
    EmailRecipient, EmailStats, GenerateContentRequest, GenerateContentResponse,
    GenerateEmailRequest, GenerateEmailResponse, NewRecipient, Page, RecipientError,
    RecipientFailure, RecipientStatus, ResponseStatus, SendEmailsRequest, SendEmailsResponse,
    TestEmailRequest, TestEmailResponse,
};
use crate::workflow::{due_event, next_status, ActionKind, LifecycleEvent};
use crate::workflow::{REVISE_DEFAULT_COMMENT, SCHEDULE_COMMENT};

const PAGE_SIZE: usize = 20;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn targeted(recipient: &EmailRecipient, ids: Option<&[Uuid]>) -> bool {
    ids.map_or(true, |ids| ids.contains(&recipient.id))
}

#[derive(Default)]
struct AuthorityState {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
    recipients: Mutex<HashMap<CampaignId, Vec<EmailRecipient>>>,
    /// Addresses whose delivery fails
    undeliverable: Mutex<HashSet<String>>,
    /// One-shot failures keyed by operation name ("approve", "schedule", "update", ...)
    injected: Mutex<HashMap<String, ApiError>>,
    read_latency: Mutex<Duration>,
    write_latency: Mutex<Duration>,
    detail_reads: AtomicUsize,
    list_reads: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
    writes: AtomicUsize,
    /// Sends accepted with `async_sending`, delivered by `deliver_queued_emails`
    email_queue: Mutex<Vec<(CampaignId, Option<Vec<Uuid>>)>>,
}

/// Shared in-memory source of truth
#[derive(Clone, Default)]
pub struct InMemoryAuthority {
    state: Arc<AuthorityState>,
}

impl InMemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a client session for `user`
    pub fn connect(&self, user: SessionUser) -> InMemoryCampaignApi {
        let token = format!("memory-token-{}", user.id);
        InMemoryCampaignApi {
            authority: self.clone(),
            session: Session::new(user, token),
        }
    }

    /// Store a campaign as-is
    pub fn insert(&self, campaign: Campaign) -> Campaign {
        lock(&self.state.campaigns).insert(campaign.id, campaign.clone());
        campaign
    }

    /// Create a draft owned by `owner` under `brand`
    pub fn create_draft(&self, owner: &SessionUser, brand: Option<&str>) -> Campaign {
        let mut campaign = Campaign::new_draft(
            Uuid::new_v4(),
            Uuid::new_v4(),
            brand.map(String::from),
            Some(owner.id),
            Utc::now(),
        );
        campaign.created_by_name = Some(owner.username.clone());
        self.insert(campaign)
    }

    /// Authoritative snapshot, history newest-first
    pub fn get(&self, id: CampaignId) -> Option<Campaign> {
        lock(&self.state.campaigns).get(&id).map(serialize)
    }

    /// Run the scheduler: activate and complete campaigns whose window says so
    pub fn advance_lifecycle(&self, now: DateTime<Utc>) -> Vec<(CampaignId, LifecycleEvent)> {
        let mut campaigns = lock(&self.state.campaigns);
        let mut advanced = Vec::new();
        for campaign in campaigns.values_mut() {
            if let Some(event) = due_event(campaign, now) {
                campaign.status = event.edge().1;
                touch(campaign);
                advanced.push((campaign.id, event));
            }
        }
        advanced
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: &str, error: ApiError) {
        lock(&self.state.injected).insert(operation.to_string(), error);
    }

    /// Run the email worker: deliver every queued send, oldest first
    pub fn deliver_queued_emails(&self) -> Vec<SendEmailsResponse> {
        let queued = std::mem::take(&mut *lock(&self.state.email_queue));
        queued
            .into_iter()
            .map(|(id, recipient_ids)| self.deliver(id, recipient_ids.as_deref()))
            .collect()
    }

    fn deliver(&self, id: CampaignId, recipient_ids: Option<&[Uuid]>) -> SendEmailsResponse {
        let undeliverable = lock(&self.state.undeliverable).clone();
        let mut all = lock(&self.state.recipients);
        let recipients = all.entry(id).or_default();
        let now = Utc::now();
        let mut report = SendEmailsResponse {
            status: ResponseStatus::Success,
            sent: 0,
            failed: 0,
            total: 0,
            errors: Vec::new(),
            task_id: None,
            message: None,
        };
        for recipient in recipients
            .iter_mut()
            .filter(|r| r.status == RecipientStatus::Pending && targeted(r, recipient_ids))
        {
            report.total += 1;
            if undeliverable.contains(&recipient.email) {
                recipient.status = RecipientStatus::Failed;
                recipient.error_message = "Mailbox unavailable".to_string();
                report.failed += 1;
                report.errors.push(RecipientFailure {
                    email: recipient.email.clone(),
                    error: recipient.error_message.clone(),
                });
            } else {
                recipient.status = RecipientStatus::Sent;
                recipient.sent_at = Some(now);
                report.sent += 1;
            }
        }
        report
    }

    /// Make delivery to `email` fail
    pub fn mark_undeliverable(&self, email: &str) {
        lock(&self.state.undeliverable).insert(email.trim().to_lowercase());
    }

    pub fn set_read_latency(&self, latency: Duration) {
        *lock(&self.state.read_latency) = latency;
    }

    pub fn set_write_latency(&self, latency: Duration) {
        *lock(&self.state.write_latency) = latency;
    }

    /// Detail fetches started
    pub fn detail_reads(&self) -> usize {
        self.state.detail_reads.load(Ordering::SeqCst)
    }

    /// List fetches started
    pub fn list_reads(&self) -> usize {
        self.state.list_reads.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently pending reads observed
    pub fn max_reads_in_flight(&self) -> usize {
        self.state.max_reads_in_flight.load(Ordering::SeqCst)
    }

    /// Mutating calls accepted
    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    fn take_injected(&self, operation: &str) -> Result<(), ApiError> {
        match lock(&self.state.injected).remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn read_delay(&self) -> ReadGuard<'_> {
        let state = &self.state;
        let now = state.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_reads_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = ReadGuard { state };
        let latency = *lock(&state.read_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    async fn write_delay(&self) {
        let latency = *lock(&self.state.write_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Keeps the in-flight read gauge accurate even when a read is dropped
struct ReadGuard<'a> {
    state: &'a AuthorityState,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.state.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bump `updated_at`, keeping it strictly increasing
fn touch(campaign: &mut Campaign) {
    let floor = campaign.updated_at + TimeDelta::milliseconds(1);
    campaign.updated_at = Utc::now().max(floor);
}

/// Wire form: history newest-first
fn serialize(campaign: &Campaign) -> Campaign {
    let mut out = campaign.clone();
    out.approval_history.reverse();
    out
}

fn visible(user: &SessionUser, campaign: &Campaign) -> bool {
    user.role == crate::session::Role::Admin
        || campaign.created_by == Some(user.id)
        || campaign
            .brand
            .as_ref()
            .is_some_and(|brand| user.brands.contains(brand))
}

fn paginate<T: Clone>(items: Vec<T>, page: Option<u32>, path: &str) -> Page<T> {
    let page = page.unwrap_or(1).max(1) as usize;
    let count = items.len();
    let start = (page - 1) * PAGE_SIZE;
    let results: Vec<T> = items.into_iter().skip(start).take(PAGE_SIZE).collect();
    Page {
        count: count as u64,
        next: (start + PAGE_SIZE < count).then(|| format!("{}?page={}", path, page + 1)),
        previous: (page > 1).then(|| format!("{}?page={}", path, page - 1)),
        results,
    }
}

/// One signed-in client of an [`InMemoryAuthority`]
#[derive(Clone)]
pub struct InMemoryCampaignApi {
    authority: InMemoryAuthority,
    session: Session,
}

impl InMemoryCampaignApi {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn authority(&self) -> &InMemoryAuthority {
        &self.authority
    }

    /// Run `f` on a campaign this session may see
    fn with_campaign<T>(
        &self,
        id: CampaignId,
        path: &str,
        f: impl FnOnce(&mut Campaign) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut campaigns = lock(&self.authority.state.campaigns);
        match campaigns.get_mut(&id) {
            Some(campaign) if visible(self.session.user(), campaign) => f(campaign),
            _ => Err(ApiError::not_found(path)),
        }
    }

    fn require_author(&self, campaign: &Campaign, path: &str) -> Result<Authority, ApiError> {
        let authority = self.session.authority_for(campaign);
        if authority.can_author() {
            Ok(authority)
        } else {
            Err(ApiError::forbidden(
                path,
                "You do not have permission to modify this campaign.",
            ))
        }
    }

    fn recipients_of(&self, id: CampaignId) -> Vec<EmailRecipient> {
        lock(&self.authority.state.recipients)
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn sync_recipient_count(&self, id: CampaignId, count: usize) {
        if let Some(campaign) = lock(&self.authority.state.campaigns).get_mut(&id) {
            campaign.email_recipient_count = count as u32;
        }
    }
}

#[async_trait]
impl CampaignApi for InMemoryCampaignApi {
    async fn current_user(&self) -> Result<SessionUser, ApiError> {
        Ok(self.session.user().clone())
    }

    async fn fetch_campaign(&self, id: CampaignId) -> Result<Campaign, ApiError> {
        let path = campaign_path(id, None);
        self.authority
            .state
            .detail_reads
            .fetch_add(1, Ordering::SeqCst);
        let _guard = self.authority.read_delay().await;
        self.authority.take_injected("fetch")?;
        self.with_campaign(id, &path, |campaign| Ok(serialize(campaign)))
    }

    async fn list_campaigns(
        &self,
        query: &CampaignQuery,
    ) -> Result<Page<CampaignSummary>, ApiError> {
        self.authority.state.list_reads.fetch_add(1, Ordering::SeqCst);
        let _guard = self.authority.read_delay().await;
        self.authority.take_injected("list")?;

        let brand = query.brand.map(|b| b.to_string());
        let mut summaries: Vec<CampaignSummary> = lock(&self.authority.state.campaigns)
            .values()
            .filter(|c| visible(self.session.user(), c))
            .filter(|c| brand.is_none() || c.brand == brand)
            .map(CampaignSummary::from)
            .filter(|s| query.matches(s))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(summaries, query.page, "campaigns/"))
    }

    async fn update_campaign(
        &self,
        id: CampaignId,
        patch: &CampaignPatch,
    ) -> Result<Campaign, ApiError> {
        let path = campaign_path(id, None);
        self.authority.write_delay().await;
        self.authority.take_injected("update")?;

        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path)?;
            let schedule_only = patch.customizations.is_none() && patch.generated_content.is_none();
            let editable = match campaign.status {
                CampaignStatus::Draft | CampaignStatus::Rejected => true,
                CampaignStatus::Approved => schedule_only,
                _ => false,
            };
            if !editable {
                return Err(ApiError::bad_request(
                    &path,
                    format!("Cannot edit campaign with status '{}'.", campaign.status),
                ));
            }

            let start = patch.scheduled_start.or(campaign.scheduled_start);
            let end = patch.scheduled_end.or(campaign.scheduled_end);
            if let (Some(start), Some(end)) = (start, end) {
                if end <= start {
                    return Err(ApiError::bad_request(
                        &path,
                        "scheduled_end: End date must be after start date.",
                    ));
                }
            }

            if let Some(customizations) = &patch.customizations {
                campaign.customizations = customizations.clone();
            }
            if let Some(content) = &patch.generated_content {
                campaign.generated_content = Some(content.clone()).filter(|c| !c.is_empty());
            }
            campaign.scheduled_start = start;
            campaign.scheduled_end = end;
            touch(campaign);
            self.authority.state.writes.fetch_add(1, Ordering::SeqCst);
            Ok(serialize(campaign))
        })
    }

    async fn delete_campaign(&self, id: CampaignId) -> Result<(), ApiError> {
        let path = campaign_path(id, None);
        self.authority.write_delay().await;
        self.authority.take_injected("delete")?;

        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path)?;
            if !matches!(
                campaign.status,
                CampaignStatus::Draft | CampaignStatus::Rejected
            ) {
                return Err(ApiError::bad_request(
                    &path,
                    format!("Cannot delete campaign with status '{}'.", campaign.status),
                ));
            }
            Ok(())
        })?;
        lock(&self.authority.state.campaigns).remove(&id);
        lock(&self.authority.state.recipients).remove(&id);
        self.authority.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transition(
        &self,
        id: CampaignId,
        action: ActionKind,
        comments: Option<&str>,
    ) -> Result<Campaign, ApiError> {
        let path = campaign_path(id, action.endpoint());
        self.authority.write_delay().await;
        self.authority.take_injected(action.as_str())?;

        let user = self.session.user();
        self.with_campaign(id, &path, |campaign| {
            if action.is_review() {
                if !user.role.can_review() {
                    return Err(ApiError::forbidden(
                        &path,
                        format!("You do not have permission to {} campaigns.", action),
                    ));
                }
            } else {
                self.require_author(campaign, &path)?;
            }

            let (Some(decision), Some(next)) =
                (action.decision(), next_status(campaign.status, action))
            else {
                return Err(ApiError::bad_request(
                    &path,
                    format!("Cannot {} campaign with status '{}'.", action, campaign.status),
                ));
            };

            let comments = match action {
                ActionKind::Reject => match comments.map(str::trim) {
                    Some(c) if !c.is_empty() => c.to_string(),
                    _ => {
                        return Err(ApiError::bad_request(
                            &path,
                            "comments: This field may not be blank.",
                        ))
                    }
                },
                ActionKind::Schedule => {
                    if campaign.schedule_bounds().is_none() {
                        return Err(ApiError::bad_request(
                            &path,
                            "Campaign must have scheduled_start and scheduled_end dates.",
                        ));
                    }
                    SCHEDULE_COMMENT.to_string()
                }
                ActionKind::Revise => comments.unwrap_or(REVISE_DEFAULT_COMMENT).to_string(),
                _ => comments.unwrap_or_default().to_string(),
            };

            let previous = campaign.status;
            campaign.status = next;
            touch(campaign);
            campaign.approval_history.push(ApprovalStep {
                id: Uuid::new_v4(),
                approver: Some(user.id),
                approver_name: Some(user.username.clone()),
                decision,
                comments,
                previous_status: previous,
                new_status: next,
                created_at: campaign.updated_at,
            });
            self.authority.state.writes.fetch_add(1, Ordering::SeqCst);
            Ok(serialize(campaign))
        })
    }

    async fn generate_content(
        &self,
        id: CampaignId,
        regenerate: bool,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiError> {
        let endpoint = if regenerate {
            "regenerate_content"
        } else {
            "generate_content"
        };
        let path = campaign_path(id, Some(endpoint));
        self.authority.write_delay().await;
        self.authority.take_injected(endpoint)?;

        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path)?;
            let mut content = if campaign.customizations.is_empty() {
                format!("{}: don't miss out!", campaign.title())
            } else {
                campaign
                    .customizations
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            if let Some(extra) = &request.additional_instructions {
                content.push_str(&format!("\n{extra}"));
            }
            let content_length = content.chars().count() as u64;
            campaign.generated_content = Some(content.clone());
            touch(campaign);

            let fallback_reason = request
                .use_ai
                .unwrap_or(false)
                .then(|| "AI provider not configured; template content used".to_string());
            if request.async_generation.unwrap_or(false) {
                return Ok(GenerateContentResponse {
                    status: ResponseStatus::Queued,
                    content: None,
                    content_length: None,
                    used_ai: None,
                    fallback_reason: None,
                    task_id: Some(Uuid::new_v4().to_string()),
                    message: Some("Content generation queued".to_string()),
                });
            }
            Ok(GenerateContentResponse {
                status: ResponseStatus::Success,
                content: Some(content),
                content_length: Some(content_length),
                used_ai: Some(false),
                fallback_reason,
                task_id: None,
                message: None,
            })
        })
    }

    async fn generate_html_email(
        &self,
        id: CampaignId,
        request: &GenerateEmailRequest,
    ) -> Result<GenerateEmailResponse, ApiError> {
        let path = campaign_path(id, Some("generate_html_email"));
        self.authority.write_delay().await;
        self.authority.take_injected("generate_html_email")?;

        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path)?;
            let Some(content) = campaign.generated_content.clone() else {
                return Err(ApiError::bad_request(
                    &path,
                    "Campaign has no generated content. Generate content first.",
                ));
            };
            let subject = campaign.title();
            let preview: String = content.chars().take(90).collect();
            let html = format!("<html><body><h1>{}</h1><p>{}</p></body></html>", subject, content);

            campaign.has_html_email = true;
            campaign.generated_html_email = Some(html.clone());
            campaign.email_subject = Some(subject.clone());
            campaign.email_preview_text = Some(preview.clone());
            touch(campaign);

            if request.async_generation.unwrap_or(false) {
                return Ok(GenerateEmailResponse {
                    status: ResponseStatus::Queued,
                    html: None,
                    subject: None,
                    preview_text: None,
                    task_id: Some(Uuid::new_v4().to_string()),
                    message: Some("Email generation queued".to_string()),
                });
            }
            Ok(GenerateEmailResponse {
                status: ResponseStatus::Success,
                html: Some(html),
                subject: Some(subject),
                preview_text: Some(preview),
                task_id: None,
                message: None,
            })
        })
    }

    async fn send_emails(
        &self,
        id: CampaignId,
        request: &SendEmailsRequest,
    ) -> Result<SendEmailsResponse, ApiError> {
        let path = campaign_path(id, Some("send_emails"));
        self.authority.write_delay().await;
        self.authority.take_injected("send_emails")?;

        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path)?;
            if campaign.status != CampaignStatus::Active {
                return Err(ApiError::bad_request(
                    &path,
                    "Campaign must be active to send emails.",
                ));
            }
            if !campaign.has_html_email {
                return Err(ApiError::bad_request(
                    &path,
                    "Generate the HTML email before sending.",
                ));
            }
            Ok(())
        })?;

        self.authority.state.writes.fetch_add(1, Ordering::SeqCst);
        let recipient_ids = request.recipient_ids.as_deref();
        if !request.async_sending {
            return Ok(self.authority.deliver(id, recipient_ids));
        }

        // Queued sends leave recipients pending until the worker runs
        let total = lock(&self.authority.state.recipients)
            .get(&id)
            .map_or(0, |recipients| {
                recipients
                    .iter()
                    .filter(|r| r.status == RecipientStatus::Pending && targeted(r, recipient_ids))
                    .count() as u32
            });
        lock(&self.authority.state.email_queue).push((id, request.recipient_ids.clone()));
        Ok(SendEmailsResponse {
            status: ResponseStatus::Queued,
            sent: 0,
            failed: 0,
            total,
            errors: Vec::new(),
            task_id: Some(Uuid::new_v4().to_string()),
            message: Some(format!("Sending {} emails", total)),
        })
    }

    async fn send_test_email(
        &self,
        id: CampaignId,
        request: &TestEmailRequest,
    ) -> Result<TestEmailResponse, ApiError> {
        let path = campaign_path(id, Some("send_test_email"));
        self.authority.take_injected("send_test_email")?;
        self.with_campaign(id, &path, |campaign| {
            if !campaign.has_html_email {
                return Err(ApiError::bad_request(
                    &path,
                    "Generate the HTML email before sending.",
                ));
            }
            if !request.email.contains('@') {
                return Err(ApiError::bad_request(&path, "email: Enter a valid email address."));
            }
            Ok(TestEmailResponse {
                status: ResponseStatus::Success,
                message: Some(format!("Test email sent to {}", request.email)),
            })
        })
    }

    async fn add_recipients(
        &self,
        id: CampaignId,
        request: &AddRecipientsRequest,
    ) -> Result<AddRecipientsResult, ApiError> {
        let path = campaign_path(id, Some("add_recipients"));
        self.authority.take_injected("add_recipients")?;
        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path).map(|_| ())
        })?;

        let mut result = AddRecipientsResult::default();
        let count = {
            let mut all = lock(&self.authority.state.recipients);
            let recipients = all.entry(id).or_default();
            let mut existing: HashSet<String> =
                recipients.iter().map(|r| r.email.clone()).collect();

            for entry in &request.recipients {
                if entry.email.trim().is_empty() {
                    continue;
                }
                let Some(NewRecipient { email, name }) = entry.normalized() else {
                    result.errors.push(RecipientError {
                        email: entry.email.clone(),
                        error: "Enter a valid email address.".to_string(),
                    });
                    continue;
                };
                if !existing.insert(email.clone()) {
                    result.skipped += 1;
                    continue;
                }
                recipients.push(EmailRecipient {
                    id: Uuid::new_v4(),
                    email,
                    name,
                    status: RecipientStatus::Pending,
                    sent_at: None,
                    error_message: String::new(),
                    created_at: Utc::now(),
                });
                result.created += 1;
            }
            recipients.len()
        };
        self.sync_recipient_count(id, count);
        Ok(result)
    }

    async fn clear_recipients(&self, id: CampaignId) -> Result<ClearRecipientsResult, ApiError> {
        let path = campaign_path(id, Some("clear_recipients"));
        self.authority.take_injected("clear_recipients")?;
        self.with_campaign(id, &path, |campaign| {
            self.require_author(campaign, &path).map(|_| ())
        })?;

        let (deleted, count) = {
            let mut all = lock(&self.authority.state.recipients);
            let recipients = all.entry(id).or_default();
            let before = recipients.len();
            recipients.retain(|r| r.status != RecipientStatus::Pending);
            (before - recipients.len(), recipients.len())
        };
        self.sync_recipient_count(id, count);
        Ok(ClearRecipientsResult {
            deleted: deleted as u32,
        })
    }

    async fn email_status(&self, id: CampaignId) -> Result<EmailStats, ApiError> {
        let path = campaign_path(id, Some("email_status"));
        self.with_campaign(id, &path, |_| Ok(()))?;
        let recipients = self.recipients_of(id);
        let count = |status: RecipientStatus| {
            recipients.iter().filter(|r| r.status == status).count() as u32
        };
        Ok(EmailStats {
            total: recipients.len() as u32,
            pending: count(RecipientStatus::Pending),
            sent: count(RecipientStatus::Sent),
            failed: count(RecipientStatus::Failed),
        })
    }

    async fn email_preview(&self, id: CampaignId) -> Result<EmailPreview, ApiError> {
        let path = campaign_path(id, Some("email_preview"));
        self.with_campaign(id, &path, |campaign| {
            Ok(EmailPreview {
                has_html_email: campaign.has_html_email,
                email_subject: campaign.email_subject.clone().unwrap_or_default(),
                email_preview_text: campaign.email_preview_text.clone().unwrap_or_default(),
                generated_html_email: campaign.generated_html_email.clone().unwrap_or_default(),
            })
        })
    }

    async fn list_recipients(
        &self,
        id: CampaignId,
        page: Option<u32>,
    ) -> Result<Page<EmailRecipient>, ApiError> {
        let path = campaign_path(id, Some("recipients"));
        self.with_campaign(id, &path, |_| Ok(()))?;
        Ok(paginate(self.recipients_of(id), page, &path))
    }
}
