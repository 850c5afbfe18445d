//! Test-case use-case service.
//!
//! # Responsibility
//! - Create cases together with their ordered steps in one transaction.
//! - Maintain case association sets and step ordering.

use crate::context::Service;
use crate::model::EntityId;
use crate::repo::testcase::{
    CaseDetail, CasePatch, NewCase, NewStep, StepDetail, StepPatch,
};
use crate::repo::RepoError;
use crate::session::SessionFactory;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Transfer input for one step inside a case draft.
#[derive(Debug, Clone, Default)]
pub struct StepDraft {
    pub action: String,
    pub expected_result: Option<String>,
    pub requirements: Vec<EntityId>,
}

/// Transfer input for creating a case with its steps.
#[derive(Debug, Clone, Default)]
pub struct CaseDraft {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub systems: Vec<EntityId>,
    pub sections: Vec<EntityId>,
    pub operators: Vec<EntityId>,
    pub drones: Vec<EntityId>,
    pub uhub_users: Vec<EntityId>,
    pub uas_zones: Vec<EntityId>,
    pub steps: Vec<StepDraft>,
}

#[derive(Debug)]
pub enum CaseServiceError {
    CaseNotFound(EntityId),
    Repo(RepoError),
}

impl Display for CaseServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaseNotFound(id) => write!(f, "case not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CaseServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CaseNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for CaseServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

type ServiceResult<T> = Result<T, CaseServiceError>;

pub struct CaseService {
    sessions: SessionFactory,
}

impl CaseService {
    pub fn new(sessions: SessionFactory) -> Self {
        Self { sessions }
    }

    /// Creates the case row, its association sets and all steps in one
    /// unit of work; nothing survives a mid-way failure.
    pub fn create_case(
        &self,
        draft: &CaseDraft,
        environment_id: EntityId,
        actor: &str,
    ) -> ServiceResult<CaseDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let created = uow.cases().create(
                &NewCase {
                    code: draft.code.clone(),
                    title: draft.title.clone(),
                    description: draft.description.clone(),
                    systems: draft.systems.clone(),
                    sections: draft.sections.clone(),
                    operators: draft.operators.clone(),
                    drones: draft.drones.clone(),
                    uhub_users: draft.uhub_users.clone(),
                    uas_zones: draft.uas_zones.clone(),
                },
                environment_id,
                actor,
            )?;

            let steps = uow.steps();
            for step in &draft.steps {
                steps.create(
                    created.case.id,
                    &NewStep {
                        position: None,
                        action: step.action.clone(),
                        expected_result: step.expected_result.clone(),
                        requirements: step.requirements.clone(),
                    },
                    actor,
                )?;
            }

            let detail = uow
                .cases()
                .get_with_relations(created.case.id)?
                .ok_or_else(|| RepoError::not_found("case", created.case.id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn update_case(
        &self,
        id: EntityId,
        patch: &CasePatch,
        actor: &str,
    ) -> ServiceResult<CaseDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.cases().update(id, patch, actor)?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn get_case(&self, id: EntityId) -> ServiceResult<Option<CaseDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.cases().get_with_relations(id))?)
    }

    pub fn list_cases(&self) -> ServiceResult<Vec<CaseDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.cases().get_all_with_relations())?)
    }

    /// Returns whether a case row was removed.
    pub fn delete_case(&self, id: EntityId) -> ServiceResult<bool> {
        let removed = self.sessions.with_unit_of_work(|uow| {
            let removed = uow.cases().delete(id)?;
            uow.commit()?;
            Ok(removed)
        })?;
        Ok(removed)
    }

    /// Appends one step to an existing case.
    pub fn add_step(
        &self,
        case_id: EntityId,
        draft: &StepDraft,
        actor: &str,
    ) -> ServiceResult<StepDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.steps().create(
                case_id,
                &NewStep {
                    position: None,
                    action: draft.action.clone(),
                    expected_result: draft.expected_result.clone(),
                    requirements: draft.requirements.clone(),
                },
                actor,
            )?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    /// Updates one step; a `requirements` entry in the patch replaces the
    /// step's requirement links wholesale.
    pub fn update_step(
        &self,
        step_id: EntityId,
        patch: &StepPatch,
        actor: &str,
    ) -> ServiceResult<StepDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.steps().update(step_id, patch, actor)?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    /// Returns whether a step row was removed.
    pub fn remove_step(&self, step_id: EntityId) -> ServiceResult<bool> {
        let removed = self.sessions.with_unit_of_work(|uow| {
            let removed = uow.steps().delete(step_id)?;
            uow.commit()?;
            Ok(removed)
        })?;
        Ok(removed)
    }

    /// Rewrites a case's step order to the given id sequence.
    pub fn reorder_steps(
        &self,
        case_id: EntityId,
        ordered_step_ids: &[EntityId],
        actor: &str,
    ) -> ServiceResult<CaseDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            uow.steps().reorder(case_id, ordered_step_ids, actor)?;
            let detail = uow
                .cases()
                .get_with_relations(case_id)?
                .ok_or_else(|| RepoError::not_found("case", case_id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }
}

impl Service for CaseService {
    fn name(&self) -> &'static str {
        "case_service"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
