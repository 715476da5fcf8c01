//! Email recipient management types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct EmailRecipient {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub status: RecipientStatus,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Recipient to add to a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct NewRecipient {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl NewRecipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }

    /// Trimmed, lower-cased copy; `None` when the address is unusable
    pub fn normalized(&self) -> Option<Self> {
        let email = self.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return None;
        }
        Some(Self {
            email,
            name: self.name.trim().to_string(),
        })
    }
}

/// Body of `add_recipients/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRecipientsRequest {
    pub recipients: Vec<NewRecipient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct RecipientError {
    pub email: String,
    pub error: String,
}

/// Response of `add_recipients/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct AddRecipientsResult {
    pub created: u32,
    /// Addresses already on the campaign
    pub skipped: u32,
    #[serde(default)]
    pub errors: Vec<RecipientError>,
}

/// Response of `clear_recipients/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ClearRecipientsResult {
    pub deleted: u32,
}

/// Response of `email_status/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct EmailStats {
    pub total: u32,
    pub pending: u32,
    pub sent: u32,
    pub failed: u32,
}

impl EmailStats {
    pub fn delivered_ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(f64::from(self.sent) / f64::from(self.total))
        }
    }
}

/// Response of `email_preview/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct EmailPreview {
    pub has_html_email: bool,
    #[serde(default)]
    pub email_subject: String,
    #[serde(default)]
    pub email_preview_text: String,
    #[serde(default)]
    pub generated_html_email: String,
}

/// Body of `send_test_email/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEmailRequest {
    pub email: String,
}

/// Response of `send_test_email/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct TestEmailResponse {
    pub status: super::ResponseStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_recipient() {
        let recipient = NewRecipient::new("  Jane.Doe@Example.COM ", " Jane ");
        let normalized = recipient.normalized().unwrap();
        assert_eq!(normalized.email, "jane.doe@example.com");
        assert_eq!(normalized.name, "Jane");
    }

    #[test]
    fn test_invalid_recipient_dropped() {
        assert!(NewRecipient::new("not-an-address", "").normalized().is_none());
        assert!(NewRecipient::new("   ", "x").normalized().is_none());
    }

    #[test]
    fn test_delivered_ratio() {
        let stats = EmailStats {
            total: 4,
            pending: 1,
            sent: 2,
            failed: 1,
        };
        assert_eq!(stats.delivered_ratio(), Some(0.5));
        assert_eq!(EmailStats::default().delivered_ratio(), None);
    }
}
