//! Campaigns API client abstraction
//!
//! `CampaignApi` is the seam between the workflow engine and the remote
//! authority. `HttpCampaignApi` talks to the REST service; `InMemoryCampaignApi`
//! serves the same contract from a shared in-process store so several sessions
//! can race against one authority in tests and simulations.

mod error;
mod http;
mod memory;

pub use error::{error_message, ApiError};
pub use http::HttpCampaignApi;
pub use memory::{InMemoryAuthority, InMemoryCampaignApi};

use async_trait::async_trait;

use crate::session::SessionUser;
use crate::types::{
    AddRecipientsRequest, AddRecipientsResult, Campaign, CampaignId, CampaignPatch, CampaignQuery,
    CampaignSummary, ClearRecipientsResult, EmailPreview, EmailRecipient, EmailStats,
    GenerateContentRequest, GenerateContentResponse, GenerateEmailRequest, GenerateEmailResponse,
    Page, SendEmailsRequest, SendEmailsResponse, TestEmailRequest, TestEmailResponse,
};
use crate::workflow::ActionKind;

/// Remote operations on campaigns, scoped to one session
#[async_trait]
pub trait CampaignApi: Send + Sync {
    /// Current user (`auth/me/`)
    async fn current_user(&self) -> Result<SessionUser, ApiError>;

    async fn fetch_campaign(&self, id: CampaignId) -> Result<Campaign, ApiError>;

    async fn list_campaigns(
        &self,
        query: &CampaignQuery,
    ) -> Result<Page<CampaignSummary>, ApiError>;

    /// Partial field update
    async fn update_campaign(
        &self,
        id: CampaignId,
        patch: &CampaignPatch,
    ) -> Result<Campaign, ApiError>;

    async fn delete_campaign(&self, id: CampaignId) -> Result<(), ApiError>;

    /// POST one of the transition endpoints and return the updated campaign
    async fn transition(
        &self,
        id: CampaignId,
        action: ActionKind,
        comments: Option<&str>,
    ) -> Result<Campaign, ApiError>;

    // ─── Content and email collaborators ─────────────────────────────────────

    /// `generate_content/`, or `regenerate_content/` when `regenerate` is set
    async fn generate_content(
        &self,
        id: CampaignId,
        regenerate: bool,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiError>;

    async fn generate_html_email(
        &self,
        id: CampaignId,
        request: &GenerateEmailRequest,
    ) -> Result<GenerateEmailResponse, ApiError>;

    async fn send_emails(
        &self,
        id: CampaignId,
        request: &SendEmailsRequest,
    ) -> Result<SendEmailsResponse, ApiError>;

    async fn send_test_email(
        &self,
        id: CampaignId,
        request: &TestEmailRequest,
    ) -> Result<TestEmailResponse, ApiError>;

    async fn add_recipients(
        &self,
        id: CampaignId,
        request: &AddRecipientsRequest,
    ) -> Result<AddRecipientsResult, ApiError>;

    /// Remove pending recipients
    async fn clear_recipients(&self, id: CampaignId) -> Result<ClearRecipientsResult, ApiError>;

    async fn email_status(&self, id: CampaignId) -> Result<EmailStats, ApiError>;

    async fn email_preview(&self, id: CampaignId) -> Result<EmailPreview, ApiError>;

    async fn list_recipients(
        &self,
        id: CampaignId,
        page: Option<u32>,
    ) -> Result<Page<EmailRecipient>, ApiError>;
}

/// Path of a campaign sub-resource relative to the API base
pub fn campaign_path(id: CampaignId, action: Option<&str>) -> String {
    match action {
        Some(action) => format!("campaigns/{}/{}/", id, action),
        None => format!("campaigns/{}/", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_campaign_path() {
        let id = Uuid::nil();
        assert_eq!(
            campaign_path(id, None),
            "campaigns/00000000-0000-0000-0000-000000000000/"
        );
        assert_eq!(
            campaign_path(id, Some("approve")),
            "campaigns/00000000-0000-0000-0000-000000000000/approve/"
        );
    }
}
