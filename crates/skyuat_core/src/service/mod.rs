//! Per-aggregate use-case services.
//!
//! # Responsibility
//! - Translate transfer inputs into repository calls.
//! - Run every public operation inside exactly one unit of work,
//!   committing before returning.
//!
//! # Invariants
//! - Services never bypass repository validation.
//! - Services hold only a session factory; no connection outlives a call.

use crate::model::file::FileOwner;

pub mod bug_service;
pub mod campaign_service;
pub mod case_service;
pub mod requirement_service;

/// Transfer input for attaching a file to a bug or step run.
#[derive(Debug, Clone)]
pub struct FileDraft {
    pub owner_kind: FileOwner,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}
