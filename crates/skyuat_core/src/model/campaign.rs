//! Campaign planning and execution-run snapshot entities.
//!
//! # Responsibility
//! - Define the campaign lifecycle record and its status machine.
//! - Define the run snapshot chain CampaignRun → CaseRun → StepRun.
//!
//! # Invariants
//! - `Campaign.code` is unique per environment.
//! - `Finished` and `Cancelled` are terminal statuses.
//! - Run rows are snapshots: they reference plan entities but are owned by
//!   their parent run and cascade with it.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Being assembled; blocks may still change.
    Draft,
    /// Execution window open; runs may be started.
    Running,
    /// Completed normally.
    Finished,
    /// Abandoned; no further runs.
    Cancelled,
}

impl CampaignStatus {
    /// Returns whether a transition from `self` to `next` is allowed.
    ///
    /// Allowed: Draft→Running, Draft→Cancelled, Running→Finished,
    /// Running→Cancelled. Terminal statuses allow nothing.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (CampaignStatus::Draft, CampaignStatus::Running)
                | (CampaignStatus::Draft, CampaignStatus::Cancelled)
                | (CampaignStatus::Running, CampaignStatus::Finished)
                | (CampaignStatus::Running, CampaignStatus::Cancelled)
        )
    }
}

/// Planned UAT campaign over one system, assembled from blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub code: String,
    pub name: String,
    pub system_id: EntityId,
    pub status: CampaignStatus,
    #[serde(flatten)]
    pub audit: Audit,
}

/// One execution of a campaign; owns its case runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRun {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub campaign_id: EntityId,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    #[serde(flatten)]
    pub audit: Audit,
}

/// Snapshot of one case inside a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRun {
    pub id: EntityId,
    pub campaign_run_id: EntityId,
    pub case_id: EntityId,
    #[serde(flatten)]
    pub audit: Audit,
}

/// Execution outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Pending,
    Passed,
    Failed,
}

/// Snapshot of one step inside a case run, recording its outcome and an
/// optional attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRun {
    pub id: EntityId,
    pub case_run_id: EntityId,
    pub step_id: EntityId,
    pub outcome: StepOutcome,
    pub note: Option<String>,
    pub file_id: Option<EntityId>,
    #[serde(flatten)]
    pub audit: Audit,
}

#[cfg(test)]
mod tests {
    use super::{CampaignStatus, StepOutcome};

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&CampaignStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&StepOutcome::Passed).unwrap(),
            "\"passed\""
        );
    }

    #[test]
    fn draft_can_start_or_cancel_only() {
        assert!(CampaignStatus::Draft.can_transition_to(CampaignStatus::Running));
        assert!(CampaignStatus::Draft.can_transition_to(CampaignStatus::Cancelled));
        assert!(!CampaignStatus::Draft.can_transition_to(CampaignStatus::Finished));
    }

    #[test]
    fn terminal_statuses_allow_no_transition() {
        for next in [
            CampaignStatus::Draft,
            CampaignStatus::Running,
            CampaignStatus::Finished,
            CampaignStatus::Cancelled,
        ] {
            assert!(!CampaignStatus::Finished.can_transition_to(next));
            assert!(!CampaignStatus::Cancelled.can_transition_to(next));
        }
    }
}
