//! Campaign use-case service.
//!
//! # Responsibility
//! - Campaign CRUD and the status machine above the repository layer.
//! - Run execution: snapshot a campaign's cases and steps into run rows,
//!   record step outcomes, finish runs.
//!
//! # Invariants
//! - Status transitions follow `CampaignStatus::can_transition_to`.
//! - `start_run` requires a running campaign and produces one case run per
//!   distinct case across the campaign's blocks.
//! - Every public operation is one unit of work.

use crate::context::Service;
use crate::model::campaign::{CampaignStatus, StepOutcome};
use crate::model::EntityId;
use crate::repo::campaign::{CampaignDetail, CampaignPatch, NewCampaign};
use crate::repo::file::NewStoredFile;
use crate::repo::run::CampaignRunDetail;
use crate::repo::RepoError;
use crate::service::FileDraft;
use crate::session::SessionFactory;
use log::info;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Transfer input for creating a campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignDraft {
    pub code: String,
    pub name: String,
    pub system_id: EntityId,
    pub blocks: Vec<EntityId>,
}

#[derive(Debug)]
pub enum CampaignServiceError {
    CampaignNotFound(EntityId),
    RunNotFound(EntityId),
    /// Requested status change is not allowed by the status machine.
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },
    /// Runs can only start while the campaign is running.
    NotRunning(EntityId),
    Repo(RepoError),
}

impl Display for CampaignServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CampaignNotFound(id) => write!(f, "campaign not found: {id}"),
            Self::RunNotFound(id) => write!(f, "campaign run not found: {id}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "campaign status cannot change from {from:?} to {to:?}")
            }
            Self::NotRunning(id) => {
                write!(f, "campaign {id} is not running; start it before executing")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CampaignServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CampaignServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

type ServiceResult<T> = Result<T, CampaignServiceError>;

pub struct CampaignService {
    sessions: SessionFactory,
}

impl CampaignService {
    pub fn new(sessions: SessionFactory) -> Self {
        Self { sessions }
    }

    pub fn create_campaign(
        &self,
        draft: &CampaignDraft,
        environment_id: EntityId,
        actor: &str,
    ) -> ServiceResult<CampaignDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.campaigns().create(
                &NewCampaign {
                    code: draft.code.clone(),
                    name: draft.name.clone(),
                    system_id: draft.system_id,
                    blocks: draft.blocks.clone(),
                },
                environment_id,
                actor,
            )?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn update_campaign(
        &self,
        id: EntityId,
        patch: &CampaignPatch,
        actor: &str,
    ) -> ServiceResult<CampaignDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.campaigns().update(id, patch, actor)?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn get_campaign(&self, id: EntityId) -> ServiceResult<Option<CampaignDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.campaigns().get_with_relations(id))?)
    }

    pub fn list_campaigns(&self) -> ServiceResult<Vec<CampaignDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.campaigns().get_all_with_relations())?)
    }

    /// Moves a campaign through its status machine.
    pub fn transition(
        &self,
        id: EntityId,
        next: CampaignStatus,
        actor: &str,
    ) -> ServiceResult<CampaignDetail> {
        // Validate outside the repository: persistence accepts any status
        // so snapshots can restore terminal states.
        let current = self
            .get_campaign(id)?
            .ok_or(CampaignServiceError::CampaignNotFound(id))?;
        if !current.campaign.status.can_transition_to(next) {
            return Err(CampaignServiceError::InvalidTransition {
                from: current.campaign.status,
                to: next,
            });
        }

        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.campaigns().update(
                id,
                &CampaignPatch {
                    status: Some(next),
                    ..CampaignPatch::default()
                },
                actor,
            )?;
            uow.commit()?;
            Ok(detail)
        })?;
        info!(
            "event=campaign_transition module=service status=ok campaign_id={id} to={next:?}"
        );
        Ok(detail)
    }

    /// Snapshots the campaign's blocks into a new run: one case run per
    /// distinct case, one pending step run per step.
    pub fn start_run(
        &self,
        campaign_id: EntityId,
        actor: &str,
    ) -> ServiceResult<CampaignRunDetail> {
        let campaign = self
            .get_campaign(campaign_id)?
            .ok_or(CampaignServiceError::CampaignNotFound(campaign_id))?;
        if campaign.campaign.status != CampaignStatus::Running {
            return Err(CampaignServiceError::NotRunning(campaign_id));
        }

        let detail = self.sessions.with_unit_of_work(|uow| {
            let run = uow.campaign_runs().create(
                campaign_id,
                campaign.campaign.environment_id,
                actor,
            )?;

            let mut seen_cases: Vec<EntityId> = Vec::new();
            for block in &campaign.blocks {
                for case_id in uow.blocks().case_ids(block.id)? {
                    if seen_cases.contains(&case_id) {
                        continue;
                    }
                    seen_cases.push(case_id);

                    let case_run = uow.case_runs().create(run.id, case_id, actor)?;
                    for step in uow.steps().get_by_case(case_id)? {
                        uow.step_runs().create(case_run.id, step.id, actor)?;
                    }
                }
            }

            let detail = uow
                .campaign_runs()
                .get_with_relations(run.id)?
                .ok_or_else(|| RepoError::not_found("campaign run", run.id))?;
            uow.commit()?;
            Ok(detail)
        })?;

        info!(
            "event=campaign_run_start module=service status=ok campaign_id={campaign_id} run_id={} cases={}",
            detail.run.id,
            detail.case_runs.len()
        );
        Ok(detail)
    }

    /// Records one step outcome, optionally registering an evidence file.
    pub fn record_step_result(
        &self,
        step_run_id: EntityId,
        outcome: StepOutcome,
        note: Option<&str>,
        evidence: Option<&FileDraft>,
        actor: &str,
    ) -> ServiceResult<()> {
        self.sessions.with_unit_of_work(|uow| {
            let step_run = uow
                .step_runs()
                .get_by_id(step_run_id)?
                .ok_or_else(|| RepoError::not_found("step run", step_run_id))?;

            let file_id = match evidence {
                Some(draft) => {
                    let case_run = uow
                        .case_runs()
                        .get_by_id(step_run.case_run_id)?
                        .ok_or_else(|| RepoError::not_found("case run", step_run.case_run_id))?;
                    let run = uow
                        .campaign_runs()
                        .get_by_id(case_run.campaign_run_id)?
                        .ok_or_else(|| {
                            RepoError::not_found("campaign run", case_run.campaign_run_id)
                        })?;
                    let file = uow.files().create(
                        &NewStoredFile {
                            owner_kind: draft.owner_kind,
                            filename: draft.filename.clone(),
                            mime_type: draft.mime_type.clone(),
                            size_bytes: draft.size_bytes,
                        },
                        run.environment_id,
                        actor,
                    )?;
                    Some(file.id)
                }
                None => step_run.file_id,
            };

            uow.step_runs()
                .record_outcome(step_run_id, outcome, note, file_id, actor)?;
            uow.commit()?;
            Ok(())
        })?;
        Ok(())
    }

    /// Stamps the run as finished.
    pub fn finish_run(&self, run_id: EntityId, actor: &str) -> ServiceResult<CampaignRunDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            uow.campaign_runs().finish(run_id, actor)?;
            let detail = uow
                .campaign_runs()
                .get_with_relations(run_id)?
                .ok_or_else(|| RepoError::not_found("campaign run", run_id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn get_run(&self, run_id: EntityId) -> ServiceResult<Option<CampaignRunDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.campaign_runs().get_with_relations(run_id))?)
    }
}

impl Service for CampaignService {
    fn name(&self) -> &'static str {
        "campaign_service"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
