//! campaignctl - campaign lifecycle workflow engine
//!
//! Validates and dispatches campaign workflow actions against the campaigns
//! API, keeps per-viewer snapshots in sync by polling, and orchestrates the
//! content and email collaborators a campaign depends on.

pub mod api;
pub mod config;
pub mod logging;
pub mod session;
pub mod sync;
pub mod types;
pub mod workflow;
