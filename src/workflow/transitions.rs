//! Campaign transition table.
//!
//! `validate` is the single authority on whether an action may be taken from a
//! status, by whom, and where it leads. It performs no I/O and holds no state.
//!
//! | status         | action         | next           |
//! |----------------|----------------|----------------|
//! | draft          | submit         | pending_review |
//! | draft          | edit, delete   | (unchanged)    |
//! | pending_review | approve        | approved       |
//! | pending_review | reject         | rejected       |
//! | approved       | schedule       | scheduled      |
//! | approved       | revise         | draft          |
//! | rejected       | revise         | draft          |
//! | rejected       | edit           | (unchanged)    |
//! | rejected       | delete         | (terminal)     |
//! | scheduled      | revise         | draft          |
//!
//! `active` and `completed` accept no user action; the server's scheduler moves
//! campaigns into them (see [`LifecycleEvent`]).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::action::{ActionKind, WorkflowAction};
use super::error::ValidationError;
use super::schedule::ScheduleWindow;
use crate::session::Authority;
use crate::types::{ApprovalStep, Campaign, CampaignStatus, Decision};

/// Comment recorded on the schedule event
pub const SCHEDULE_COMMENT: &str = "Campaign scheduled";
/// Comment recorded when revise is sent without one
pub const REVISE_DEFAULT_COMMENT: &str = "Returned for revision";

/// Outcome of a valid action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Status change recorded by exactly one approval step
    Move {
        from: CampaignStatus,
        to: CampaignStatus,
        decision: Decision,
        comments: String,
        /// Present for `schedule`
        window: Option<ScheduleWindow>,
    },
    /// Field edit, no status change
    Unchanged,
    /// Delete; the campaign ceases to exist
    Terminal,
}

impl Transition {
    pub fn next_status(&self) -> Option<CampaignStatus> {
        match self {
            Transition::Move { to, .. } => Some(*to),
            _ => None,
        }
    }

    pub fn edge(&self) -> Option<(CampaignStatus, CampaignStatus)> {
        match self {
            Transition::Move { from, to, .. } => Some((*from, *to)),
            _ => None,
        }
    }

    /// Approval step to record for this transition
    pub fn audit_step(&self, approver: Option<i64>, at: DateTime<Utc>) -> Option<ApprovalStep> {
        match self {
            Transition::Move {
                from,
                to,
                decision,
                comments,
                ..
            } => Some(ApprovalStep {
                id: Uuid::new_v4(),
                approver,
                approver_name: None,
                decision: *decision,
                comments: comments.clone(),
                previous_status: *from,
                new_status: *to,
                created_at: at,
            }),
            _ => None,
        }
    }
}

/// Target of `action` from `status`, if the table has the pair
fn target(status: CampaignStatus, action: ActionKind) -> Option<Option<CampaignStatus>> {
    use ActionKind as A;
    use CampaignStatus as S;

    match (status, action) {
        (S::Draft, A::Submit) => Some(Some(S::PendingReview)),
        (S::Draft | S::Rejected, A::Edit) => Some(None),
        (S::Draft | S::Rejected, A::Delete) => Some(None),
        (S::PendingReview, A::Approve) => Some(Some(S::Approved)),
        (S::PendingReview, A::Reject) => Some(Some(S::Rejected)),
        (S::Approved, A::Schedule) => Some(Some(S::Scheduled)),
        (S::Approved | S::Rejected | S::Scheduled, A::Revise) => Some(Some(S::Draft)),
        _ => None,
    }
}

/// Whether the table lists `action` for `status`
pub fn allows(status: CampaignStatus, action: ActionKind) -> bool {
    target(status, action).is_some()
}

/// Status reached by a status-changing `action` from `status`
pub fn next_status(status: CampaignStatus, action: ActionKind) -> Option<CampaignStatus> {
    target(status, action).flatten()
}

fn permitted(action: ActionKind, authority: &Authority) -> bool {
    if action.is_review() {
        authority.can_review()
    } else {
        authority.can_author()
    }
}

/// Validate `action` against the table, the caller's authority and the payload
pub fn validate(
    status: CampaignStatus,
    action: &WorkflowAction,
    authority: &Authority,
) -> Result<Transition, ValidationError> {
    let kind = action.kind();
    let to = target(status, kind).ok_or(ValidationError::NotAllowed {
        action: kind,
        status,
    })?;

    if !permitted(kind, authority) {
        return Err(ValidationError::Forbidden {
            action: kind,
            role: authority.role,
        });
    }

    let comments = action.comments().unwrap_or_default().to_string();
    let moved = |decision: Decision, comments: String, window: Option<ScheduleWindow>| {
        to.map(|to| Transition::Move {
            from: status,
            to,
            decision,
            comments,
            window,
        })
        .ok_or(ValidationError::NotAllowed {
            action: kind,
            status,
        })
    };

    match action {
        WorkflowAction::Submit { .. } => moved(Decision::Submitted, comments, None),
        WorkflowAction::Approve { .. } => moved(Decision::Approved, comments, None),
        WorkflowAction::Reject { comments } => {
            if comments.trim().is_empty() {
                return Err(ValidationError::CommentsRequired { action: kind });
            }
            moved(Decision::Rejected, comments.clone(), None)
        }
        WorkflowAction::Schedule { start, end } => {
            let window = ScheduleWindow::new(*start, *end)?;
            moved(Decision::Approved, SCHEDULE_COMMENT.to_string(), Some(window))
        }
        WorkflowAction::Revise { comments } => {
            let comments = comments
                .clone()
                .unwrap_or_else(|| REVISE_DEFAULT_COMMENT.to_string());
            moved(Decision::RequestedChanges, comments, None)
        }
        WorkflowAction::Edit(patch) => {
            if patch.is_empty() {
                return Err(ValidationError::EmptyEdit);
            }
            if let (Some(start), Some(end)) = (patch.scheduled_start, patch.scheduled_end) {
                ScheduleWindow::new(Some(start), Some(end))?;
            }
            Ok(Transition::Unchanged)
        }
        WorkflowAction::Delete => Ok(Transition::Terminal),
    }
}

/// Actions the caller may trigger from `status`
pub fn available_actions(status: CampaignStatus, authority: &Authority) -> Vec<ActionKind> {
    ActionKind::all()
        .iter()
        .copied()
        .filter(|kind| allows(status, *kind) && permitted(*kind, authority))
        .collect()
}

/// Whether edits (including content generation) are currently accepted
pub fn is_editable(status: CampaignStatus) -> bool {
    allows(status, ActionKind::Edit)
}

/// Edit gate for field changes made outside `validate`, such as content generation
pub fn check_edit(status: CampaignStatus, authority: &Authority) -> Result<(), ValidationError> {
    if !is_editable(status) {
        return Err(ValidationError::NotAllowed {
            action: ActionKind::Edit,
            status,
        });
    }
    if !authority.can_author() {
        return Err(ValidationError::Forbidden {
            action: ActionKind::Edit,
            role: authority.role,
        });
    }
    Ok(())
}

/// Status advancement performed by the server's scheduler, never by a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `scheduled -> active` once the window starts
    Activate,
    /// `active -> completed` once the window ends
    Complete,
}

impl LifecycleEvent {
    pub fn edge(&self) -> (CampaignStatus, CampaignStatus) {
        match self {
            LifecycleEvent::Activate => (CampaignStatus::Scheduled, CampaignStatus::Active),
            LifecycleEvent::Complete => (CampaignStatus::Active, CampaignStatus::Completed),
        }
    }

    /// Identify a server-side advancement between two observed statuses
    pub fn from_edge(from: CampaignStatus, to: CampaignStatus) -> Option<Self> {
        [LifecycleEvent::Activate, LifecycleEvent::Complete]
            .into_iter()
            .find(|event| event.edge() == (from, to))
    }
}

/// Scheduler event that is due for `campaign` at `now`
pub fn due_event(campaign: &Campaign, now: DateTime<Utc>) -> Option<LifecycleEvent> {
    match campaign.status {
        CampaignStatus::Scheduled => campaign
            .scheduled_start
            .filter(|start| *start <= now)
            .map(|_| LifecycleEvent::Activate),
        CampaignStatus::Active => campaign
            .scheduled_end
            .filter(|end| *end <= now)
            .map(|_| LifecycleEvent::Complete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::types::CampaignPatch;
    use chrono::TimeZone;

    fn admin() -> Authority {
        Authority::of_role(Role::Admin)
    }

    fn originator(role: Role) -> Authority {
        Authority {
            role,
            is_originator: true,
            has_brand_write: false,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    fn sample_actions() -> Vec<WorkflowAction> {
        vec![
            WorkflowAction::Submit { comments: None },
            WorkflowAction::Approve { comments: None },
            WorkflowAction::Reject {
                comments: "Off brand".to_string(),
            },
            WorkflowAction::Schedule {
                start: Some(at(1, 9)),
                end: Some(at(15, 18)),
            },
            WorkflowAction::Revise { comments: None },
            WorkflowAction::Edit(CampaignPatch {
                generated_content: Some("Hi".to_string()),
                ..Default::default()
            }),
            WorkflowAction::Delete,
        ]
    }

    #[test]
    fn test_every_pair_outside_the_table_fails() {
        for status in CampaignStatus::all() {
            for action in sample_actions() {
                let listed = target(*status, action.kind()).is_some();
                let result = validate(*status, &action, &admin());
                if listed {
                    assert!(result.is_ok(), "{status} {} should pass", action.kind());
                } else {
                    assert_eq!(
                        result,
                        Err(ValidationError::NotAllowed {
                            action: action.kind(),
                            status: *status
                        }),
                    );
                }
            }
        }
    }

    #[test]
    fn test_terminal_statuses_have_no_actions() {
        assert!(available_actions(CampaignStatus::Active, &admin()).is_empty());
        assert!(available_actions(CampaignStatus::Completed, &admin()).is_empty());
    }

    #[test]
    fn test_submit_records_submitted() {
        let transition = validate(
            CampaignStatus::Draft,
            &WorkflowAction::Submit { comments: None },
            &originator(Role::LocationManager),
        )
        .unwrap();
        assert_eq!(
            transition.edge(),
            Some((CampaignStatus::Draft, CampaignStatus::PendingReview))
        );
        let step = transition.audit_step(Some(4), at(1, 9)).unwrap();
        assert_eq!(step.decision, Decision::Submitted);
        assert_eq!(step.comments, "");
    }

    #[test]
    fn test_reject_requires_comments() {
        for blank in ["", "   ", "\n\t"] {
            let result = validate(
                CampaignStatus::PendingReview,
                &WorkflowAction::Reject {
                    comments: blank.to_string(),
                },
                &admin(),
            );
            assert_eq!(
                result,
                Err(ValidationError::CommentsRequired {
                    action: ActionKind::Reject
                })
            );
        }

        let ok = validate(
            CampaignStatus::PendingReview,
            &WorkflowAction::Reject {
                comments: "x".to_string(),
            },
            &admin(),
        );
        assert_eq!(ok.unwrap().next_status(), Some(CampaignStatus::Rejected));
    }

    #[test]
    fn test_review_restricted_to_reviewers() {
        let approve = WorkflowAction::Approve { comments: None };
        let lm = originator(Role::LocationManager);
        assert_eq!(
            validate(CampaignStatus::PendingReview, &approve, &lm),
            Err(ValidationError::Forbidden {
                action: ActionKind::Approve,
                role: Role::LocationManager
            })
        );
        let bm = Authority::of_role(Role::BrandManager);
        assert!(validate(CampaignStatus::PendingReview, &approve, &bm).is_ok());
    }

    #[test]
    fn test_authoring_requires_ownership_or_brand_write() {
        let submit = WorkflowAction::Submit { comments: None };
        let viewer = Authority::of_role(Role::Viewer);
        assert!(matches!(
            validate(CampaignStatus::Draft, &submit, &viewer),
            Err(ValidationError::Forbidden { .. })
        ));

        let outsider = Authority::of_role(Role::BrandManager);
        assert!(validate(CampaignStatus::Draft, &submit, &outsider).is_err());

        let member = Authority {
            has_brand_write: true,
            ..outsider
        };
        assert!(validate(CampaignStatus::Draft, &submit, &member).is_ok());
        assert!(validate(CampaignStatus::Draft, &submit, &originator(Role::Viewer)).is_ok());
    }

    #[test]
    fn test_status_checked_before_permission() {
        let viewer = Authority::of_role(Role::Viewer);
        let result = validate(
            CampaignStatus::Completed,
            &WorkflowAction::Approve { comments: None },
            &viewer,
        );
        assert_eq!(result.unwrap_err().field(), "status");
    }

    #[test]
    fn test_schedule_is_recorded_as_schedule_event() {
        let transition = validate(
            CampaignStatus::Approved,
            &WorkflowAction::Schedule {
                start: Some(at(1, 9)),
                end: Some(at(15, 18)),
            },
            &admin(),
        )
        .unwrap();
        let step = transition.audit_step(Some(1), at(1, 8)).unwrap();
        assert_eq!(step.decision, Decision::Approved);
        assert_eq!(step.comments, SCHEDULE_COMMENT);
        assert!(step.is_schedule_event());
    }

    #[test]
    fn test_schedule_bounds_checked() {
        let schedule = |start, end| WorkflowAction::Schedule { start, end };
        for action in [
            schedule(Some(at(1, 9)), Some(at(1, 9))),
            schedule(Some(at(2, 9)), Some(at(1, 9))),
            schedule(None, Some(at(1, 9))),
            schedule(Some(at(1, 9)), None),
        ] {
            let result = validate(CampaignStatus::Approved, &action, &admin());
            assert!(matches!(result, Err(ValidationError::Schedule(_))));
        }
    }

    #[test]
    fn test_revise_default_comment() {
        let transition = validate(
            CampaignStatus::Scheduled,
            &WorkflowAction::Revise { comments: None },
            &admin(),
        )
        .unwrap();
        let step = transition.audit_step(None, at(1, 9)).unwrap();
        assert_eq!(step.decision, Decision::RequestedChanges);
        assert_eq!(step.comments, REVISE_DEFAULT_COMMENT);
        assert!(step.is_system());
    }

    #[test]
    fn test_edit_gate() {
        let edit = WorkflowAction::Edit(CampaignPatch {
            generated_content: Some("New copy".to_string()),
            ..Default::default()
        });
        assert_eq!(
            validate(CampaignStatus::Draft, &edit, &admin()),
            Ok(Transition::Unchanged)
        );
        assert_eq!(
            validate(CampaignStatus::Rejected, &edit, &admin()),
            Ok(Transition::Unchanged)
        );
        assert!(validate(CampaignStatus::Approved, &edit, &admin()).is_err());
        assert!(is_editable(CampaignStatus::Draft));
        assert!(is_editable(CampaignStatus::Rejected));
        assert!(!is_editable(CampaignStatus::PendingReview));
        assert!(!is_editable(CampaignStatus::Scheduled));

        let empty = WorkflowAction::Edit(CampaignPatch::default());
        assert_eq!(
            validate(CampaignStatus::Draft, &empty, &admin()),
            Err(ValidationError::EmptyEdit)
        );
    }

    #[test]
    fn test_check_edit() {
        assert!(check_edit(CampaignStatus::Draft, &originator(Role::LocationManager)).is_ok());
        assert_eq!(
            check_edit(CampaignStatus::Approved, &admin()).unwrap_err().field(),
            "status"
        );
        assert_eq!(
            check_edit(CampaignStatus::Draft, &Authority::of_role(Role::Viewer))
                .unwrap_err()
                .field(),
            "role"
        );
    }

    #[test]
    fn test_delete_is_terminal() {
        assert_eq!(
            validate(CampaignStatus::Rejected, &WorkflowAction::Delete, &admin()),
            Ok(Transition::Terminal)
        );
    }

    #[test]
    fn test_validate_is_idempotent() {
        let action = WorkflowAction::Approve {
            comments: Some("Looks good".to_string()),
        };
        let first = validate(CampaignStatus::PendingReview, &action, &admin());
        let second = validate(CampaignStatus::PendingReview, &action, &admin());
        assert_eq!(first, second);
    }

    #[test]
    fn test_available_actions_for_rejected() {
        let actions = available_actions(CampaignStatus::Rejected, &admin());
        assert_eq!(
            actions,
            vec![ActionKind::Revise, ActionKind::Edit, ActionKind::Delete]
        );
        let viewer = Authority::of_role(Role::Viewer);
        assert!(available_actions(CampaignStatus::Rejected, &viewer).is_empty());
    }

    #[test]
    fn test_due_event() {
        let mut campaign = Campaign::new_draft(Uuid::new_v4(), Uuid::new_v4(), None, Some(1), at(1, 0));
        campaign.scheduled_start = Some(at(1, 9));
        campaign.scheduled_end = Some(at(15, 18));
        assert_eq!(due_event(&campaign, at(2, 0)), None);

        campaign.status = CampaignStatus::Scheduled;
        assert_eq!(due_event(&campaign, at(1, 8)), None);
        assert_eq!(due_event(&campaign, at(1, 9)), Some(LifecycleEvent::Activate));

        campaign.status = CampaignStatus::Active;
        assert_eq!(due_event(&campaign, at(10, 0)), None);
        assert_eq!(due_event(&campaign, at(15, 18)), Some(LifecycleEvent::Complete));
    }

    #[test]
    fn test_lifecycle_events() {
        assert_eq!(
            LifecycleEvent::from_edge(CampaignStatus::Scheduled, CampaignStatus::Active),
            Some(LifecycleEvent::Activate)
        );
        assert_eq!(
            LifecycleEvent::from_edge(CampaignStatus::Draft, CampaignStatus::Active),
            None
        );
    }
}
