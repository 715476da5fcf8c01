//! Wire types for the campaigns API.
//!
//! These types use ts-rs and schemars to generate TypeScript definitions
//! and JSON schemas for dashboard front ends from a single Rust source of truth.

mod campaign;
mod email;
mod generation;
mod page;

pub use campaign::{
    ApprovalStep, Campaign, CampaignId, CampaignPatch, CampaignQuery, CampaignStatus,
    CampaignSummary, Decision,
};
pub use email::{
    AddRecipientsRequest, AddRecipientsResult, ClearRecipientsResult, EmailPreview,
    EmailRecipient, EmailStats, NewRecipient, RecipientError, RecipientStatus, TestEmailRequest,
    TestEmailResponse,
};
pub use generation::{
    BatchReport, ContentOutcome, EmailArtifactOutcome, EmailArtifacts, EmailDispatchOutcome,
    GenerateContentRequest, GenerateContentResponse, GenerateEmailRequest, GenerateEmailResponse,
    GeneratedContent, RecipientFailure, ResponseStatus, SendEmailsRequest, SendEmailsResponse,
};
pub use page::Page;
