//! Workflow actions a user can request on a campaign.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::types::{CampaignPatch, Decision};

/// A requested action; each variant carries only the payload it needs
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowAction {
    Submit { comments: Option<String> },
    Approve { comments: Option<String> },
    /// Rejection must explain itself
    Reject { comments: String },
    Schedule {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    Revise { comments: Option<String> },
    Edit(CampaignPatch),
    Delete,
}

impl WorkflowAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            WorkflowAction::Submit { .. } => ActionKind::Submit,
            WorkflowAction::Approve { .. } => ActionKind::Approve,
            WorkflowAction::Reject { .. } => ActionKind::Reject,
            WorkflowAction::Schedule { .. } => ActionKind::Schedule,
            WorkflowAction::Revise { .. } => ActionKind::Revise,
            WorkflowAction::Edit(_) => ActionKind::Edit,
            WorkflowAction::Delete => ActionKind::Delete,
        }
    }

    /// Comments supplied with the action, if any
    pub fn comments(&self) -> Option<&str> {
        match self {
            WorkflowAction::Submit { comments }
            | WorkflowAction::Approve { comments }
            | WorkflowAction::Revise { comments } => comments.as_deref(),
            WorkflowAction::Reject { comments } => Some(comments),
            _ => None,
        }
    }
}

/// Payload-free action tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Submit,
    Approve,
    Reject,
    Schedule,
    Revise,
    Edit,
    Delete,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::Submit,
            ActionKind::Approve,
            ActionKind::Reject,
            ActionKind::Schedule,
            ActionKind::Revise,
            ActionKind::Edit,
            ActionKind::Delete,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Submit => "submit",
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
            ActionKind::Schedule => "schedule",
            ActionKind::Revise => "revise",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
        }
    }

    /// Transition endpoint under `campaigns/{id}/`; `None` for edit and delete
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            ActionKind::Edit | ActionKind::Delete => None,
            other => Some(other.as_str()),
        }
    }

    /// Decision recorded by a status-changing action
    pub fn decision(&self) -> Option<Decision> {
        match self {
            ActionKind::Submit => Some(Decision::Submitted),
            ActionKind::Approve | ActionKind::Schedule => Some(Decision::Approved),
            ActionKind::Reject => Some(Decision::Rejected),
            ActionKind::Revise => Some(Decision::RequestedChanges),
            ActionKind::Edit | ActionKind::Delete => None,
        }
    }

    /// Approve and reject are reserved for reviewers
    pub fn is_review(&self) -> bool {
        matches!(self, ActionKind::Approve | ActionKind::Reject)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}
