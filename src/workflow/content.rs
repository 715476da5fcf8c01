//! Content and email orchestration.
//!
//! Wraps the generation and sending collaborators with the local checks a
//! campaign must pass first, normalizes their success/queued/error answers and
//! invalidates the campaign's cached detail after anything that may change it.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::dispatcher::snapshot;
use super::error::{ValidationError, WorkflowError};
use super::transitions::check_edit;
use crate::api::CampaignApi;
use crate::session::Session;
use crate::sync::SnapshotCache;
use crate::types::{
    AddRecipientsRequest, AddRecipientsResult, Campaign, CampaignId, CampaignStatus,
    ClearRecipientsResult, ContentOutcome, EmailArtifactOutcome, EmailDispatchOutcome,
    EmailPreview, EmailRecipient, EmailStats, GenerateContentRequest, GenerateEmailRequest,
    NewRecipient, Page, SendEmailsRequest, TestEmailRequest, TestEmailResponse,
};

#[derive(Clone)]
pub struct ContentOrchestrator {
    api: Arc<dyn CampaignApi>,
    session: Session,
    cache: Arc<SnapshotCache>,
}

impl ContentOrchestrator {
    pub fn new(api: Arc<dyn CampaignApi>, session: Session, cache: Arc<SnapshotCache>) -> Self {
        Self {
            api,
            session,
            cache,
        }
    }

    async fn current(&self, id: CampaignId) -> Result<Campaign, WorkflowError> {
        Ok(snapshot(self.api.as_ref(), &self.cache, id).await?)
    }

    fn require_author(&self, campaign: &Campaign) -> Result<(), ValidationError> {
        let authority = self.session.authority_for(campaign);
        if authority.can_author() {
            Ok(())
        } else {
            Err(ValidationError::precondition(
                "role",
                format!("a {} may not modify this campaign", authority.role),
            ))
        }
    }

    #[instrument(skip(self, request), fields(campaign = %id))]
    pub async fn generate_content(
        &self,
        id: CampaignId,
        request: &GenerateContentRequest,
    ) -> Result<ContentOutcome, WorkflowError> {
        self.content(id, false, request).await
    }

    #[instrument(skip(self, request), fields(campaign = %id))]
    pub async fn regenerate_content(
        &self,
        id: CampaignId,
        request: &GenerateContentRequest,
    ) -> Result<ContentOutcome, WorkflowError> {
        self.content(id, true, request).await
    }

    async fn content(
        &self,
        id: CampaignId,
        regenerate: bool,
        request: &GenerateContentRequest,
    ) -> Result<ContentOutcome, WorkflowError> {
        let campaign = self.current(id).await?;
        check_edit(campaign.status, &self.session.authority_for(&campaign))?;

        let response = self.api.generate_content(id, regenerate, request).await?;
        let outcome = ContentOutcome::from(response);
        match &outcome {
            ContentOutcome::Ready(generated) => {
                if let Some(reason) = &generated.fallback_reason {
                    info!(reason = %reason, "Template fallback used");
                }
                info!(length = ?generated.content_length, used_ai = generated.used_ai, "Content generated");
            }
            ContentOutcome::Queued { task_id } => info!(task_id = ?task_id, "Content generation queued"),
            ContentOutcome::Failed { message } => warn!(message = %message, "Content generation failed"),
        }
        self.cache.invalidate_detail(id).await;
        Ok(outcome)
    }

    #[instrument(skip(self, request), fields(campaign = %id))]
    pub async fn generate_html_email(
        &self,
        id: CampaignId,
        request: &GenerateEmailRequest,
    ) -> Result<EmailArtifactOutcome, WorkflowError> {
        let campaign = self.current(id).await?;
        self.require_author(&campaign)?;
        if !campaign.has_content() {
            return Err(ValidationError::precondition(
                "generated_content",
                "generate content before creating the HTML email",
            )
            .into());
        }

        let outcome = EmailArtifactOutcome::from(self.api.generate_html_email(id, request).await?);
        if let EmailArtifactOutcome::Failed { message } = &outcome {
            warn!(message = %message, "Email generation failed");
        }
        self.cache.invalidate_detail(id).await;
        Ok(outcome)
    }

    /// Send the campaign email; a batch with failed recipients is still `Completed`
    #[instrument(skip(self, request), fields(campaign = %id))]
    pub async fn send_emails(
        &self,
        id: CampaignId,
        request: &SendEmailsRequest,
    ) -> Result<EmailDispatchOutcome, WorkflowError> {
        let campaign = self.current(id).await?;
        self.require_author(&campaign)?;
        if campaign.status != CampaignStatus::Active {
            return Err(ValidationError::precondition(
                "status",
                format!("campaign must be active to send emails (is '{}')", campaign.status),
            )
            .into());
        }
        if !campaign.has_html_email {
            return Err(ValidationError::precondition(
                "has_html_email",
                "generate the HTML email before sending",
            )
            .into());
        }

        let outcome = EmailDispatchOutcome::from(self.api.send_emails(id, request).await?);
        match &outcome {
            EmailDispatchOutcome::Completed(report) if report.failed > 0 => {
                warn!(summary = %report.summary(), "Some recipients failed")
            }
            EmailDispatchOutcome::Completed(report) => info!(summary = %report.summary(), "Emails sent"),
            EmailDispatchOutcome::Queued { task_id } => info!(task_id = ?task_id, "Email sending queued"),
            EmailDispatchOutcome::Failed { message } => warn!(message = %message, "Email sending failed"),
        }
        self.cache.invalidate_detail(id).await;
        Ok(outcome)
    }

    pub async fn send_test_email(
        &self,
        id: CampaignId,
        email: &str,
    ) -> Result<TestEmailResponse, WorkflowError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(ValidationError::precondition("email", "enter a valid email address").into());
        }
        let campaign = self.current(id).await?;
        if !campaign.has_html_email {
            return Err(ValidationError::precondition(
                "has_html_email",
                "generate the HTML email before sending a test",
            )
            .into());
        }
        let request = TestEmailRequest {
            email: email.to_string(),
        };
        Ok(self.api.send_test_email(id, &request).await?)
    }

    /// Normalize and add recipients; blank entries are dropped silently
    #[instrument(skip(self, recipients), fields(campaign = %id, offered = recipients.len()))]
    pub async fn add_recipients(
        &self,
        id: CampaignId,
        recipients: &[NewRecipient],
    ) -> Result<AddRecipientsResult, WorkflowError> {
        let normalized: Vec<NewRecipient> =
            recipients.iter().filter_map(NewRecipient::normalized).collect();
        if normalized.is_empty() {
            return Err(
                ValidationError::precondition("recipients", "no valid email addresses").into(),
            );
        }
        let dropped = recipients.len() - normalized.len();
        if dropped > 0 {
            info!(dropped, "Dropped invalid recipient entries");
        }

        let campaign = self.current(id).await?;
        self.require_author(&campaign)?;

        let request = AddRecipientsRequest {
            recipients: normalized,
        };
        let result = self.api.add_recipients(id, &request).await?;
        info!(created = result.created, skipped = result.skipped, "Recipients added");
        self.cache.invalidate_detail(id).await;
        Ok(result)
    }

    /// Remove recipients that have not been sent to yet
    pub async fn clear_recipients(&self, id: CampaignId) -> Result<ClearRecipientsResult, WorkflowError> {
        let result = self.api.clear_recipients(id).await?;
        self.cache.invalidate_detail(id).await;
        Ok(result)
    }

    pub async fn email_status(&self, id: CampaignId) -> Result<EmailStats, WorkflowError> {
        Ok(self.api.email_status(id).await?)
    }

    pub async fn email_preview(&self, id: CampaignId) -> Result<EmailPreview, WorkflowError> {
        Ok(self.api.email_preview(id).await?)
    }

    pub async fn recipients(
        &self,
        id: CampaignId,
        page: Option<u32>,
    ) -> Result<Page<EmailRecipient>, WorkflowError> {
        Ok(self.api.list_recipients(id, page).await?)
    }
}
