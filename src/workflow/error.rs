//! Workflow error taxonomy.

use thiserror::Error;

use super::action::ActionKind;
use super::schedule::{ScheduleError, ScheduleWindow};
use crate::api::ApiError;
use crate::session::Role;
use crate::types::{Campaign, CampaignId, CampaignStatus};

/// Local, pre-flight failure; never sent to the network
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Cannot {action} campaign with status '{status}'.")]
    NotAllowed {
        action: ActionKind,
        status: CampaignStatus,
    },
    #[error("comments are required to {action} a campaign")]
    CommentsRequired { action: ActionKind },
    #[error("a {role} may not {action} this campaign")]
    Forbidden { action: ActionKind, role: Role },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("no fields to update")]
    EmptyEdit,
    /// Orchestration precondition on another campaign field
    #[error("{field}: {reason}")]
    Precondition { field: &'static str, reason: String },
}

impl ValidationError {
    /// Field-level reason for form display
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::NotAllowed { .. } => "status",
            ValidationError::CommentsRequired { .. } => "comments",
            ValidationError::Forbidden { .. } => "role",
            ValidationError::Schedule(err) => err.field(),
            ValidationError::EmptyEdit => "fields",
            ValidationError::Precondition { field, .. } => field,
        }
    }

    pub fn precondition(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Precondition {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a dispatched workflow action
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The server refused because another actor changed the campaign first
    #[error("campaign state changed (expected '{expected}', now '{actual}'), please refresh")]
    Conflict {
        expected: CampaignStatus,
        actual: CampaignStatus,
        latest: Box<Campaign>,
    },
    #[error(transparent)]
    Remote(#[from] ApiError),
    /// Dates were persisted, the status transition was not
    #[error("schedule dates were saved but the campaign was not scheduled: {source}")]
    SchedulePartial {
        window: ScheduleWindow,
        #[source]
        source: ApiError,
    },
    #[error("another action is already running for campaign {0}")]
    InFlight(CampaignId),
    /// The runtime stopped the action before it finished; its outcome is unknown
    #[error("action on campaign {0} was interrupted, refresh to see its outcome")]
    Interrupted(CampaignId),
}

impl WorkflowError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Conflict { .. })
    }

    /// Snapshot fetched while detecting a conflict
    pub fn latest(&self) -> Option<&Campaign> {
        match self {
            WorkflowError::Conflict { latest, .. } => Some(latest),
            _ => None,
        }
    }

    /// Message suitable for end users
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Conflict { .. } => {
                "Campaign state changed, please refresh.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_reasons() {
        assert_eq!(
            ValidationError::CommentsRequired {
                action: ActionKind::Reject
            }
            .field(),
            "comments"
        );
        assert_eq!(
            ValidationError::from(ScheduleError::MissingStart).field(),
            "scheduled_start"
        );
        assert_eq!(
            ValidationError::precondition("generated_content", "generate content first").field(),
            "generated_content"
        );
    }

    #[test]
    fn test_not_allowed_message() {
        let err = ValidationError::NotAllowed {
            action: ActionKind::Approve,
            status: CampaignStatus::Draft,
        };
        assert_eq!(err.to_string(), "Cannot approve campaign with status 'draft'.");
    }
}
