//! Request/response contracts for the asynchronous collaborators a campaign
//! depends on: content generation, HTML email generation and email sending.
//!
//! Each collaborator answers either inline (`success`), by deferring the work
//! to a background queue (`queued`), or with an `error` payload. Queued results
//! are picked up later by re-fetching the campaign.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Status field common to every collaborator response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResponseStatus {
    Success,
    Queued,
    Error,
}

// ─── Content generation ──────────────────────────────────────────────────────

/// Body of `generate_content/` and `regenerate_content/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_generation: Option<bool>,
}

impl GenerateContentRequest {
    pub fn with_ai(mut self, use_ai: bool) -> Self {
        self.use_ai = Some(use_ai);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.additional_instructions = if instructions.trim().is_empty() {
            None
        } else {
            Some(instructions)
        };
        self
    }

    pub fn queued(mut self, async_generation: bool) -> Self {
        self.async_generation = Some(async_generation);
        self
    }
}

/// Raw response of the content generation endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct GenerateContentResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "contentLength")]
    pub content_length: Option<u64>,
    #[serde(default, alias = "usedAI", alias = "usedAi")]
    pub used_ai: Option<bool>,
    #[serde(default, alias = "fallbackReason")]
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Content returned inline by a successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    /// Absent when the server only reported the length
    pub content: Option<String>,
    pub content_length: Option<u64>,
    pub used_ai: bool,
    /// Why the template fallback was used instead of AI
    pub fallback_reason: Option<String>,
}

/// Normalized result of a content generation call
#[derive(Debug, Clone, PartialEq)]
pub enum ContentOutcome {
    Ready(GeneratedContent),
    Queued { task_id: Option<String> },
    Failed { message: String },
}

impl ContentOutcome {
    /// Whether the caller must re-fetch the campaign to see the content
    pub fn needs_refetch(&self) -> bool {
        match self {
            ContentOutcome::Ready(generated) => generated.content.is_none(),
            ContentOutcome::Queued { .. } => true,
            ContentOutcome::Failed { .. } => false,
        }
    }
}

impl From<GenerateContentResponse> for ContentOutcome {
    fn from(response: GenerateContentResponse) -> Self {
        match response.status {
            ResponseStatus::Success => {
                let content_length = response
                    .content_length
                    .or_else(|| response.content.as_ref().map(|c| c.chars().count() as u64));
                ContentOutcome::Ready(GeneratedContent {
                    content: response.content,
                    content_length,
                    used_ai: response.used_ai.unwrap_or(false),
                    fallback_reason: response.fallback_reason,
                })
            }
            ResponseStatus::Queued => ContentOutcome::Queued {
                task_id: response.task_id,
            },
            ResponseStatus::Error => ContentOutcome::Failed {
                message: response
                    .message
                    .unwrap_or_else(|| "content generation failed".to_string()),
            },
        }
    }
}

// ─── HTML email generation ───────────────────────────────────────────────────

/// Body of `generate_html_email/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct GenerateEmailRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_generation: Option<bool>,
}

/// Raw response of `generate_html_email/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct GenerateEmailResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, alias = "previewText")]
    pub preview_text: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Email artifacts returned inline
#[derive(Debug, Clone, PartialEq)]
pub struct EmailArtifacts {
    pub html: Option<String>,
    pub subject: Option<String>,
    pub preview_text: Option<String>,
}

/// Normalized result of an HTML email generation call
#[derive(Debug, Clone, PartialEq)]
pub enum EmailArtifactOutcome {
    Ready(EmailArtifacts),
    Queued { task_id: Option<String> },
    Failed { message: String },
}

impl From<GenerateEmailResponse> for EmailArtifactOutcome {
    fn from(response: GenerateEmailResponse) -> Self {
        match response.status {
            ResponseStatus::Success => EmailArtifactOutcome::Ready(EmailArtifacts {
                html: response.html,
                subject: response.subject,
                preview_text: response.preview_text,
            }),
            ResponseStatus::Queued => EmailArtifactOutcome::Queued {
                task_id: response.task_id,
            },
            ResponseStatus::Error => EmailArtifactOutcome::Failed {
                message: response
                    .message
                    .unwrap_or_else(|| "email generation failed".to_string()),
            },
        }
    }
}

// ─── Email sending ───────────────────────────────────────────────────────────

/// Body of `send_emails/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct SendEmailsRequest {
    /// Restrict the batch to these recipients; all pending recipients otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_ids: Option<Vec<Uuid>>,
    pub async_sending: bool,
}

impl Default for SendEmailsRequest {
    fn default() -> Self {
        Self {
            recipient_ids: None,
            async_sending: true,
        }
    }
}

/// One recipient that could not be reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct RecipientFailure {
    pub email: String,
    #[serde(default)]
    pub error: String,
}

/// Raw response of `send_emails/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct SendEmailsResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub sent: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub errors: Vec<RecipientFailure>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Per-batch delivery counts; individual failures do not fail the batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub sent: u32,
    pub failed: u32,
    pub total: u32,
    pub errors: Vec<RecipientFailure>,
}

impl BatchReport {
    /// Completed, but some recipients failed
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.sent > 0
    }

    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }

    pub fn summary(&self) -> String {
        format!(
            "Sent: {}, Failed: {}, Total: {}",
            self.sent, self.failed, self.total
        )
    }
}

/// Normalized result of an email send call
#[derive(Debug, Clone, PartialEq)]
pub enum EmailDispatchOutcome {
    Completed(BatchReport),
    Queued { task_id: Option<String> },
    Failed { message: String },
}

impl From<SendEmailsResponse> for EmailDispatchOutcome {
    fn from(response: SendEmailsResponse) -> Self {
        match response.status {
            ResponseStatus::Success => EmailDispatchOutcome::Completed(BatchReport {
                sent: response.sent,
                failed: response.failed,
                total: response.total,
                errors: response.errors,
            }),
            ResponseStatus::Queued => EmailDispatchOutcome::Queued {
                task_id: response.task_id,
            },
            ResponseStatus::Error => EmailDispatchOutcome::Failed {
                message: response
                    .message
                    .unwrap_or_else(|| "email sending failed".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_success_inline() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "status": "success",
            "content": "Summer sale at Store #12!",
            "used_ai": false,
            "fallback_reason": "AI not configured"
        }))
        .unwrap();

        match ContentOutcome::from(response) {
            ContentOutcome::Ready(generated) => {
                assert_eq!(generated.content_length, Some(25));
                assert!(!generated.used_ai);
                assert_eq!(
                    generated.fallback_reason.as_deref(),
                    Some("AI not configured")
                );
            }
            other => panic!("Expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_content_camel_case_aliases() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "status": "success",
            "contentLength": 120,
            "usedAI": true
        }))
        .unwrap();
        let outcome = ContentOutcome::from(response);
        assert!(outcome.needs_refetch());
        match outcome {
            ContentOutcome::Ready(generated) => {
                assert_eq!(generated.content_length, Some(120));
                assert!(generated.used_ai);
            }
            other => panic!("Expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_content_queued_needs_refetch() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"status": "queued", "task_id": "abc"})).unwrap();
        let outcome = ContentOutcome::from(response);
        assert!(outcome.needs_refetch());
        assert_eq!(
            outcome,
            ContentOutcome::Queued {
                task_id: Some("abc".to_string())
            }
        );
    }

    #[test]
    fn test_content_request_omits_unset_fields() {
        let request = GenerateContentRequest::default()
            .with_ai(true)
            .with_instructions("   ");
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"use_ai": true}));
    }

    #[test]
    fn test_send_emails_partial_batch_is_success() {
        let response: SendEmailsResponse = serde_json::from_value(json!({
            "status": "success",
            "sent": 8,
            "failed": 2,
            "total": 10,
            "errors": [{"email": "a@example.com", "error": "mailbox full"}]
        }))
        .unwrap();

        match EmailDispatchOutcome::from(response) {
            EmailDispatchOutcome::Completed(report) => {
                assert!(report.is_partial());
                assert!(!report.all_failed());
                assert_eq!(report.summary(), "Sent: 8, Failed: 2, Total: 10");
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn test_email_error_defaults_message() {
        let response: GenerateEmailResponse =
            serde_json::from_value(json!({"status": "error"})).unwrap();
        assert_eq!(
            EmailArtifactOutcome::from(response),
            EmailArtifactOutcome::Failed {
                message: "email generation failed".to_string()
            }
        );
    }
}
