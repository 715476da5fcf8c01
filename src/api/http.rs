//! REST client for the campaigns service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{campaign_path, ApiError, CampaignApi};
use crate::session::{Session, SessionUser};
use crate::types::{
    AddRecipientsRequest, AddRecipientsResult, Campaign, CampaignId, CampaignPatch, CampaignQuery,
    CampaignSummary, ClearRecipientsResult, EmailPreview, EmailRecipient, EmailStats,
    GenerateContentRequest, GenerateContentResponse, GenerateEmailRequest, GenerateEmailResponse,
    Page, SendEmailsRequest, SendEmailsResponse, TestEmailRequest, TestEmailResponse,
};
use crate::workflow::ActionKind;

const ME_PATH: &str = "auth/me/";

/// Transition endpoints answer `{status, campaign}`; tolerate a bare campaign too
#[derive(Deserialize)]
#[serde(untagged)]
enum TransitionBody {
    Envelope {
        #[allow(dead_code)]
        status: String,
        campaign: Box<Campaign>,
    },
    Bare(Box<Campaign>),
}

#[derive(Serialize)]
struct CommentsBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
}

/// HTTP implementation of [`CampaignApi`] bound to one session
#[derive(Clone)]
pub struct HttpCampaignApi {
    base_url: String,
    client: Client,
    session: Session,
}

impl HttpCampaignApi {
    pub fn new(base_url: &str, timeout: Duration, session: Session) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client: build_client(timeout)?,
            session,
        })
    }

    /// Resolve the current user for `token` and build a session from it
    #[instrument(skip(token))]
    pub async fn sign_in(
        base_url: &str,
        timeout: Duration,
        token: &str,
    ) -> Result<Session, ApiError> {
        let client = build_client(timeout)?;
        let url = format!("{}{}", normalize_base_url(base_url), ME_PATH);
        debug!("GET {}", url);

        let response = client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::network(ME_PATH, e.to_string()))?;
        let user: SessionUser = decode(ME_PATH, check(ME_PATH, response).await?).await?;
        debug!(user = %user.username, role = %user.role, "signed in");
        Ok(Session::new(user, token))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send an authenticated request and check its status
    async fn send<B: Serialize + ?Sized + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(self.session.access_token())
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(path, e.to_string()))?;
        check(path, response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        let response = self.send::<()>(Method::GET, path, query, None).await?;
        decode(path, response).await
    }

    async fn post<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::POST, path, &[], Some(body)).await?;
        decode(path, response).await
    }
}

fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ApiError::network("client", e.to_string()))
}

fn normalize_base_url(base_url: &str) -> String {
    format!("{}/", base_url.trim_end_matches('/'))
}

/// Map non-success responses to `ApiError`
async fn check(path: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let err = ApiError::from_status(path, status.as_u16(), &body, retry_after);
    warn!("{}", err);
    Err(err)
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::network(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(path, e.to_string()))
}

#[async_trait]
impl CampaignApi for HttpCampaignApi {
    async fn current_user(&self) -> Result<SessionUser, ApiError> {
        self.get(ME_PATH, &[]).await
    }

    #[instrument(skip(self))]
    async fn fetch_campaign(&self, id: CampaignId) -> Result<Campaign, ApiError> {
        self.get(&campaign_path(id, None), &[]).await
    }

    #[instrument(skip(self))]
    async fn list_campaigns(
        &self,
        query: &CampaignQuery,
    ) -> Result<Page<CampaignSummary>, ApiError> {
        self.get("campaigns/", &query.to_pairs()).await
    }

    #[instrument(skip(self, patch))]
    async fn update_campaign(
        &self,
        id: CampaignId,
        patch: &CampaignPatch,
    ) -> Result<Campaign, ApiError> {
        let path = campaign_path(id, None);
        let response = self.send(Method::PATCH, &path, &[], Some(patch)).await?;
        decode(&path, response).await
    }

    #[instrument(skip(self))]
    async fn delete_campaign(&self, id: CampaignId) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &campaign_path(id, None), &[], None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, comments))]
    async fn transition(
        &self,
        id: CampaignId,
        action: ActionKind,
        comments: Option<&str>,
    ) -> Result<Campaign, ApiError> {
        let Some(endpoint) = action.endpoint() else {
            return Err(ApiError::bad_request(
                campaign_path(id, None),
                format!("{} is not a status transition", action),
            ));
        };
        let path = campaign_path(id, Some(endpoint));
        // schedule/ takes no body; the dates are already persisted
        let body = CommentsBody {
            comments: if action == ActionKind::Schedule {
                None
            } else {
                comments
            },
        };
        let parsed: TransitionBody = self.post(&path, &body).await?;
        Ok(match parsed {
            TransitionBody::Envelope { campaign, .. } | TransitionBody::Bare(campaign) => *campaign,
        })
    }

    #[instrument(skip(self, request))]
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
        self.post(&campaign_path(id, Some(endpoint)), request).await
    }

    #[instrument(skip(self, request))]
    async fn generate_html_email(
        &self,
        id: CampaignId,
        request: &GenerateEmailRequest,
    ) -> Result<GenerateEmailResponse, ApiError> {
        self.post(&campaign_path(id, Some("generate_html_email")), request)
            .await
    }

    #[instrument(skip(self, request))]
    async fn send_emails(
        &self,
        id: CampaignId,
        request: &SendEmailsRequest,
    ) -> Result<SendEmailsResponse, ApiError> {
        self.post(&campaign_path(id, Some("send_emails")), request)
            .await
    }

    #[instrument(skip(self, request))]
    async fn send_test_email(
        &self,
        id: CampaignId,
        request: &TestEmailRequest,
    ) -> Result<TestEmailResponse, ApiError> {
        self.post(&campaign_path(id, Some("send_test_email")), request)
            .await
    }

    #[instrument(skip(self, request))]
    async fn add_recipients(
        &self,
        id: CampaignId,
        request: &AddRecipientsRequest,
    ) -> Result<AddRecipientsResult, ApiError> {
        self.post(&campaign_path(id, Some("add_recipients")), request)
            .await
    }

    #[instrument(skip(self))]
    async fn clear_recipients(&self, id: CampaignId) -> Result<ClearRecipientsResult, ApiError> {
        self.post(
            &campaign_path(id, Some("clear_recipients")),
            &serde_json::json!({}),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn email_status(&self, id: CampaignId) -> Result<EmailStats, ApiError> {
        self.get(&campaign_path(id, Some("email_status")), &[]).await
    }

    #[instrument(skip(self))]
    async fn email_preview(&self, id: CampaignId) -> Result<EmailPreview, ApiError> {
        self.get(&campaign_path(id, Some("email_preview")), &[]).await
    }

    #[instrument(skip(self))]
    async fn list_recipients(
        &self,
        id: CampaignId,
        page: Option<u32>,
    ) -> Result<Page<EmailRecipient>, ApiError> {
        let query: Vec<(&'static str, String)> =
            page.map(|p| ("page", p.to_string())).into_iter().collect();
        self.get(&campaign_path(id, Some("recipients")), &query)
            .await
    }
}

impl std::fmt::Debug for HttpCampaignApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCampaignApi")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:8000/api/v1"),
            "http://localhost:8000/api/v1/"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8000/api/v1///"),
            "http://localhost:8000/api/v1/"
        );
    }

    #[test]
    fn test_transition_body_shapes() {
        let campaign = serde_json::json!({
            "id": "7f0c2b8e-4a7e-4a43-9d57-3f8f1d1b0a11",
            "location": "0b5f8a0e-0c8e-4a55-8f0e-5d4f3a2b1c01",
            "template": "1c6a9b1f-1d9f-4b66-9a1f-6e5a4b3c2d02",
            "status": "approved",
            "created_at": "2025-05-01T09:00:00Z",
            "updated_at": "2025-05-01T10:00:00Z"
        });

        let envelope: TransitionBody = serde_json::from_value(
            serde_json::json!({"status": "approved", "campaign": campaign.clone()}),
        )
        .unwrap();
        assert!(matches!(envelope, TransitionBody::Envelope { .. }));

        let bare: TransitionBody = serde_json::from_value(campaign).unwrap();
        assert!(matches!(bare, TransitionBody::Bare(_)));
    }

    #[test]
    fn test_comments_body_omits_none() {
        let body = CommentsBody { comments: None };
        assert_eq!(serde_json::to_string(&body).unwrap(), "{}");
    }
}
