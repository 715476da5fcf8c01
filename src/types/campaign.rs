//! Campaign aggregate and audit record types.
//!
//! Field names follow the wire format of the campaigns API so snapshots can be
//! deserialized directly from detail and list responses.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

/// Campaign identifier
pub type CampaignId = Uuid;

/// Lifecycle status of a location campaign (closed set)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CampaignStatus {
    /// Being prepared by its author
    #[default]
    Draft,
    /// Waiting for an approver
    PendingReview,
    /// Approved, not yet scheduled
    Approved,
    /// Rejected by an approver
    Rejected,
    /// Has a publication window
    Scheduled,
    /// Running
    Active,
    /// Publication window has ended
    Completed,
}

impl CampaignStatus {
    /// Every status, in lifecycle order
    pub fn all() -> &'static [CampaignStatus] {
        &[
            CampaignStatus::Draft,
            CampaignStatus::PendingReview,
            CampaignStatus::Approved,
            CampaignStatus::Rejected,
            CampaignStatus::Scheduled,
            CampaignStatus::Active,
            CampaignStatus::Completed,
        ]
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::PendingReview => "pending_review",
            CampaignStatus::Approved => "approved",
            CampaignStatus::Rejected => "rejected",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "Draft",
            CampaignStatus::PendingReview => "Pending Review",
            CampaignStatus::Approved => "Approved",
            CampaignStatus::Rejected => "Rejected",
            CampaignStatus::Scheduled => "Scheduled",
            CampaignStatus::Active => "Active",
            CampaignStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CampaignStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown campaign status '{s}'"))
    }
}

/// Decision recorded by an approval step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Decision {
    Submitted,
    Approved,
    Rejected,
    RequestedChanges,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Submitted => "submitted",
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::RequestedChanges => "requested_changes",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record for one status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ApprovalStep {
    pub id: Uuid,
    /// User who made the decision; `None` for system-initiated steps
    #[serde(default)]
    #[ts(type = "number | null")]
    pub approver: Option<i64>,
    #[serde(default)]
    pub approver_name: Option<String>,
    pub decision: Decision,
    #[serde(default)]
    pub comments: String,
    pub previous_status: CampaignStatus,
    pub new_status: CampaignStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl ApprovalStep {
    /// The status edge this step records
    pub fn edge(&self) -> (CampaignStatus, CampaignStatus) {
        (self.previous_status, self.new_status)
    }

    pub fn is_system(&self) -> bool {
        self.approver.is_none()
    }

    /// Scheduling is recorded without a dedicated decision; the edge identifies it
    pub fn is_schedule_event(&self) -> bool {
        self.new_status == CampaignStatus::Scheduled
    }
}

/// Full campaign snapshot as returned by the detail endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Campaign {
    pub id: CampaignId,
    pub location: Uuid,
    #[serde(default)]
    pub location_name: Option<String>,
    pub template: Uuid,
    #[serde(default)]
    pub template_name: Option<String>,
    /// Brand owning the location (stringified id)
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    pub status: CampaignStatus,
    /// Template variable values keyed by variable name
    #[serde(default, deserialize_with = "de_customizations")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub customizations: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "de_blank_as_none")]
    #[schemars(with = "Option<String>")]
    pub generated_content: Option<String>,
    #[serde(default)]
    pub has_html_email: bool,
    #[serde(default, deserialize_with = "de_blank_as_none")]
    #[schemars(with = "Option<String>")]
    pub generated_html_email: Option<String>,
    #[serde(default, deserialize_with = "de_blank_as_none")]
    #[schemars(with = "Option<String>")]
    pub email_subject: Option<String>,
    #[serde(default, deserialize_with = "de_blank_as_none")]
    #[schemars(with = "Option<String>")]
    pub email_preview_text: Option<String>,
    #[serde(default)]
    pub email_recipient_count: u32,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Serialized newest-first by the server
    #[serde(default)]
    pub approval_history: Vec<ApprovalStep>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Fresh draft with no content, schedule or history
    pub fn new_draft(
        location: Uuid,
        template: Uuid,
        brand: Option<String>,
        created_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            location_name: None,
            template,
            template_name: None,
            brand,
            brand_name: None,
            created_by,
            created_by_name: None,
            status: CampaignStatus::Draft,
            customizations: BTreeMap::new(),
            generated_content: None,
            has_html_email: false,
            generated_html_email: None,
            email_subject: None,
            email_preview_text: None,
            email_recipient_count: 0,
            scheduled_start: None,
            scheduled_end: None,
            approval_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_content(&self) -> bool {
        self.generated_content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Both schedule bounds, when set
    pub fn schedule_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.scheduled_start, self.scheduled_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Display title used by list and detail views
    pub fn title(&self) -> String {
        match (&self.location_name, &self.template_name) {
            (Some(location), Some(template)) => format!("{location} - {template}"),
            (Some(location), None) => location.clone(),
            _ => self.id.to_string(),
        }
    }
}

/// Campaign projection returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct CampaignSummary {
    pub id: CampaignId,
    pub location: Uuid,
    #[serde(default)]
    pub location_name: Option<String>,
    pub template: Uuid,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    pub status: CampaignStatus,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Campaign> for CampaignSummary {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id,
            location: campaign.location,
            location_name: campaign.location_name.clone(),
            template: campaign.template,
            template_name: campaign.template_name.clone(),
            brand_name: campaign.brand_name.clone(),
            status: campaign.status,
            scheduled_start: campaign.scheduled_start,
            scheduled_end: campaign.scheduled_end,
            created_at: campaign.created_at,
        }
    }
}

/// Partial field update sent with `PATCH campaigns/{id}/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customizations: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
}

impl CampaignPatch {
    pub fn is_empty(&self) -> bool {
        self.customizations.is_none()
            && self.generated_content.is_none()
            && self.scheduled_start.is_none()
            && self.scheduled_end.is_none()
    }

    /// Whether the patch touches the publication window
    pub fn touches_schedule(&self) -> bool {
        self.scheduled_start.is_some() || self.scheduled_end.is_some()
    }
}

/// Filters for the campaign list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CampaignQuery {
    pub status: Option<CampaignStatus>,
    pub location: Option<Uuid>,
    pub template: Option<Uuid>,
    pub brand: Option<Uuid>,
    pub page: Option<u32>,
}

impl CampaignQuery {
    /// Campaigns waiting for an approver
    pub fn approval_queue() -> Self {
        Self {
            status: Some(CampaignStatus::PendingReview),
            ..Default::default()
        }
    }

    /// Query-string pairs in a stable order
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(location) = self.location {
            pairs.push(("location", location.to_string()));
        }
        if let Some(template) = self.template {
            pairs.push(("template", template.to_string()));
        }
        if let Some(brand) = self.brand {
            pairs.push(("brand", brand.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }

    pub fn matches(&self, summary: &CampaignSummary) -> bool {
        self.status.map_or(true, |s| s == summary.status)
            && self.location.map_or(true, |l| l == summary.location)
            && self.template.map_or(true, |t| t == summary.template)
    }
}

impl fmt::Display for CampaignQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self.to_pairs();
        if pairs.is_empty() {
            return f.write_str("all");
        }
        let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&rendered.join("&"))
    }
}

/// Accepts scalar JSON values and keeps their string form
fn de_customizations<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Blank text fields come back as `""`
fn de_blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail_json() -> serde_json::Value {
        json!({
            "id": "7f0c2b8e-4a7e-4a43-9d57-3f8f1d1b0a11",
            "location": "0b5f8a0e-0c8e-4a55-8f0e-5d4f3a2b1c01",
            "location_name": "Store #12",
            "template": "1c6a9b1f-1d9f-4b66-9a1f-6e5a4b3c2d02",
            "template_name": "Summer Sale",
            "brand": "2d7bac20-2eaf-4c77-ab20-7f6b5c4d3e03",
            "brand_name": "Acme",
            "created_by": 4,
            "created_by_name": "lm",
            "status": "pending_review",
            "customizations": {"sale_type": "Summer", "discount_percentage": 30},
            "generated_content": "",
            "generated_html_email": "",
            "email_subject": "",
            "email_preview_text": "",
            "has_html_email": false,
            "email_recipient_count": 0,
            "scheduled_start": null,
            "scheduled_end": null,
            "approval_history": [{
                "id": "3e8bcd31-3fb0-4d88-bc31-807c6d5e4f04",
                "approver": 4,
                "approver_name": "lm",
                "decision": "submitted",
                "comments": "",
                "previous_status": "draft",
                "new_status": "pending_review",
                "created_at": "2025-05-01T10:00:00Z"
            }],
            "created_at": "2025-05-01T09:00:00Z",
            "updated_at": "2025-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_deserialize_detail() {
        let campaign: Campaign = serde_json::from_value(detail_json()).unwrap();
        assert_eq!(campaign.status, CampaignStatus::PendingReview);
        assert_eq!(campaign.approval_history.len(), 1);
        assert_eq!(campaign.approval_history[0].decision, Decision::Submitted);
        assert_eq!(campaign.title(), "Store #12 - Summer Sale");
    }

    #[test]
    fn test_blank_text_fields_are_none() {
        let campaign: Campaign = serde_json::from_value(detail_json()).unwrap();
        assert!(campaign.generated_content.is_none());
        assert!(campaign.email_subject.is_none());
        assert!(!campaign.has_content());
    }

    #[test]
    fn test_numeric_customizations_are_stringified() {
        let campaign: Campaign = serde_json::from_value(detail_json()).unwrap();
        assert_eq!(campaign.customizations["discount_percentage"], "30");
        assert_eq!(campaign.customizations["sale_type"], "Summer");
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut value = detail_json();
        value["status"] = json!("archived");
        assert!(serde_json::from_value::<Campaign>(value).is_err());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            "pending_review".parse::<CampaignStatus>().unwrap(),
            CampaignStatus::PendingReview
        );
        assert!("Pending".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = CampaignPatch {
            generated_content: Some("Hello".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"generated_content": "Hello"}));
        assert!(!patch.touches_schedule());
    }

    #[test]
    fn test_query_pairs() {
        let query = CampaignQuery::approval_queue();
        assert_eq!(
            query.to_pairs(),
            vec![("status", "pending_review".to_string())]
        );
        assert_eq!(query.to_string(), "status=pending_review");
        assert_eq!(CampaignQuery::default().to_string(), "all");
    }
}
