//! Campaign lifecycle workflow engine.
//!
//! - `transitions`: the status table and the pure validator
//! - `schedule`: publication window invariants
//! - `audit`: append-only approval history
//! - `dispatcher`: runs validated actions against the API
//! - `content`: generation and email collaborators

mod action;
mod audit;
mod content;
mod dispatcher;
mod error;
mod schedule;
mod transitions;

pub use action::{ActionKind, WorkflowAction};
pub use audit::{AuditError, AuditTrail};
pub use content::ContentOrchestrator;
pub use dispatcher::{Dispatched, WorkflowDispatcher};
pub use error::{ValidationError, WorkflowError};
pub use schedule::{parse_schedule_input, truncate_to_minute, ScheduleError, ScheduleWindow};
pub use transitions::{
    allows, available_actions, check_edit, due_event, is_editable, next_status, validate,
    LifecycleEvent, Transition, REVISE_DEFAULT_COMMENT, SCHEDULE_COMMENT,
};
