//! Requirement use-case service.
//!
//! # Responsibility
//! - Create/update/list/delete requirements from transfer inputs.
//! - Resolve lookup reference data (systems, sections) with create-or-get
//!   semantics for form-driven entry.

use crate::context::Service;
use crate::model::lookup::{Section, System};
use crate::model::EntityId;
use crate::repo::requirement::{NewRequirement, RequirementDetail, RequirementPatch};
use crate::repo::RepoError;
use crate::session::SessionFactory;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Transfer input for creating a requirement.
#[derive(Debug, Clone, Default)]
pub struct RequirementDraft {
    pub code: String,
    pub definition: String,
    pub systems: Vec<EntityId>,
    pub sections: Vec<EntityId>,
}

/// Service error for requirement use-cases.
#[derive(Debug)]
pub enum RequirementServiceError {
    RequirementNotFound(EntityId),
    Repo(RepoError),
}

impl Display for RequirementServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequirementNotFound(id) => write!(f, "requirement not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RequirementServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RequirementNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for RequirementServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

type ServiceResult<T> = Result<T, RequirementServiceError>;

pub struct RequirementService {
    sessions: SessionFactory,
}

impl RequirementService {
    pub fn new(sessions: SessionFactory) -> Self {
        Self { sessions }
    }

    pub fn create_requirement(
        &self,
        draft: &RequirementDraft,
        environment_id: EntityId,
        actor: &str,
    ) -> ServiceResult<RequirementDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.requirements().create(
                &NewRequirement {
                    code: draft.code.clone(),
                    definition: draft.definition.clone(),
                    systems: draft.systems.clone(),
                    sections: draft.sections.clone(),
                },
                environment_id,
                actor,
            )?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn update_requirement(
        &self,
        id: EntityId,
        patch: &RequirementPatch,
        actor: &str,
    ) -> ServiceResult<RequirementDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let detail = uow.requirements().update(id, patch, actor)?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn get_requirement(&self, id: EntityId) -> ServiceResult<Option<RequirementDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.requirements().get_with_relations(id))?)
    }

    pub fn list_requirements(&self) -> ServiceResult<Vec<RequirementDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.requirements().get_all_with_relations())?)
    }

    /// Returns whether a requirement row was removed.
    pub fn delete_requirement(&self, id: EntityId) -> ServiceResult<bool> {
        let removed = self.sessions.with_unit_of_work(|uow| {
            let removed = uow.requirements().delete(id)?;
            uow.commit()?;
            Ok(removed)
        })?;
        Ok(removed)
    }

    /// Create-or-get a system by name.
    pub fn ensure_system(&self, name: &str) -> ServiceResult<(System, bool)> {
        let result = self.sessions.with_unit_of_work(|uow| {
            let result = uow.systems().get_or_create(name)?;
            uow.commit()?;
            Ok(result)
        })?;
        Ok(result)
    }

    /// Create-or-get a section by name.
    pub fn ensure_section(&self, name: &str) -> ServiceResult<(Section, bool)> {
        let result = self.sessions.with_unit_of_work(|uow| {
            let result = uow.sections().get_or_create(name)?;
            uow.commit()?;
            Ok(result)
        })?;
        Ok(result)
    }
}

impl Service for RequirementService {
    fn name(&self) -> &'static str {
        "requirement_service"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
