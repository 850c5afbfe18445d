//! Bug tracking entities.
//!
//! # Invariants
//! - `BugHistory` is append-only: entries are created, never mutated.
//! - A bug always references a system; the campaign run link is optional.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Bug workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

/// Defect found during acceptance testing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bug {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub status: BugStatus,
    pub system_id: EntityId,
    pub campaign_run_id: Option<EntityId>,
    pub file_id: Option<EntityId>,
    #[serde(flatten)]
    pub audit: Audit,
}

/// One append-only change-log entry of a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugHistoryEntry {
    pub id: EntityId,
    pub bug_id: EntityId,
    pub actor: String,
    pub summary: String,
    pub created_at: i64,
}
