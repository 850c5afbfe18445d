//! Test-plan entities: requirements, cases, steps and blocks.
//!
//! # Invariants
//! - `Requirement.code` and `Case.code` are unique per environment.
//! - A requirement must reference at least one system and one section;
//!   the rule is enforced by the repository at create/update time.
//! - Steps belong to exactly one case and are ordered by `position`.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Acceptance requirement traced to systems, sections, steps and bugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub code: String,
    pub definition: String,
    #[serde(flatten)]
    pub audit: Audit,
}

/// Test case with ordered steps and association sets over the fleet,
/// U-hub and zone entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

/// One ordered step of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: EntityId,
    pub case_id: EntityId,
    /// 1-based order inside the owning case.
    pub position: i64,
    pub action: String,
    pub expected_result: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

/// Grouping of cases under one system, used to assemble campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub name: String,
    pub system_id: EntityId,
    #[serde(flatten)]
    pub audit: Audit,
}
