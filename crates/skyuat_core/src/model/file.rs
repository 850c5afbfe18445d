//! Generic file attachment record.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Entity family a stored file is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOwner {
    Bug,
    StepRun,
}

/// Attachment metadata; the payload lives outside the database.
///
/// `stored_name` is a generated collision-free name; `filename` keeps the
/// original client name for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub owner_kind: FileOwner,
    pub filename: String,
    pub stored_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    #[serde(flatten)]
    pub audit: Audit,
}
