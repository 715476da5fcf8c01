//! Append-only approval history.
//!
//! Steps are stored in causal (insertion) order and never reordered or
//! truncated. Newest-first is a derived view for display.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{ApprovalStep, CampaignStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("approval step {0} is already recorded")]
    DuplicateStep(Uuid),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTrail {
    steps: Vec<ApprovalStep>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild causal order from the server's newest-first serialization
    pub fn from_server(history: &[ApprovalStep]) -> Result<Self, AuditError> {
        let mut ordered: Vec<ApprovalStep> = history.iter().rev().cloned().collect();
        // Stable, so steps sharing a timestamp keep their causal position
        ordered.sort_by_key(|step| step.created_at);

        let mut trail = Self::new();
        for step in ordered {
            trail.append(step)?;
        }
        Ok(trail)
    }

    pub fn append(&mut self, step: ApprovalStep) -> Result<(), AuditError> {
        if self.steps.iter().any(|existing| existing.id == step.id) {
            return Err(AuditError::DuplicateStep(step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Display order, newest first
    pub fn sorted_descending(&self) -> Vec<&ApprovalStep> {
        self.steps.iter().rev().collect()
    }

    /// Causal order
    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    pub fn latest(&self) -> Option<&ApprovalStep> {
        self.steps.last()
    }

    /// Whether the newest step records `edge`
    pub fn confirms(&self, edge: (CampaignStatus, CampaignStatus)) -> bool {
        self.latest().is_some_and(|step| step.edge() == edge)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Server serialization order, newest first
    pub fn to_server_order(&self) -> Vec<ApprovalStep> {
        self.steps.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Decision;
    use chrono::{TimeZone, Utc};

    fn step(minute: u32, from: CampaignStatus, to: CampaignStatus, decision: Decision) -> ApprovalStep {
        ApprovalStep {
            id: Uuid::new_v4(),
            approver: Some(1),
            approver_name: None,
            decision,
            comments: String::new(),
            previous_status: from,
            new_status: to,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    fn lifecycle() -> Vec<ApprovalStep> {
        vec![
            step(0, CampaignStatus::Draft, CampaignStatus::PendingReview, Decision::Submitted),
            step(5, CampaignStatus::PendingReview, CampaignStatus::Approved, Decision::Approved),
            step(9, CampaignStatus::Approved, CampaignStatus::Scheduled, Decision::Approved),
        ]
    }

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut trail = AuditTrail::new();
        for s in lifecycle() {
            trail.append(s).unwrap();
        }
        assert_eq!(trail.len(), 3);
        assert_eq!(trail.steps()[0].decision, Decision::Submitted);

        let display: Vec<Decision> = trail.sorted_descending().iter().map(|s| s.decision).collect();
        assert_eq!(
            display,
            vec![Decision::Approved, Decision::Approved, Decision::Submitted]
        );
        // Display does not reorder storage
        assert_eq!(trail.steps()[0].decision, Decision::Submitted);
    }

    #[test]
    fn test_from_server_restores_causal_order() {
        let mut newest_first = lifecycle();
        newest_first.reverse();
        let trail = AuditTrail::from_server(&newest_first).unwrap();
        assert_eq!(trail.steps(), lifecycle().as_slice());
        assert_eq!(trail.to_server_order(), newest_first);
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let s = lifecycle().remove(0);
        let mut trail = AuditTrail::new();
        trail.append(s.clone()).unwrap();
        assert_eq!(trail.append(s.clone()), Err(AuditError::DuplicateStep(s.id)));
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_confirms_latest_edge() {
        let trail = AuditTrail::from_server(&lifecycle()).unwrap();
        assert!(trail.confirms((CampaignStatus::Approved, CampaignStatus::Scheduled)));
        assert!(!trail.confirms((CampaignStatus::Draft, CampaignStatus::PendingReview)));
        assert!(!AuditTrail::new().confirms((CampaignStatus::Draft, CampaignStatus::PendingReview)));
    }
}
