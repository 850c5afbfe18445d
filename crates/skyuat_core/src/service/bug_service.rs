//! Bug use-case service.
//!
//! # Responsibility
//! - Bug reporting and workflow updates with an append-only change log:
//!   every mutation writes a history entry in the same transaction.
//! - Evidence file attachment.

use crate::context::Service;
use crate::model::bug::BugStatus;
use crate::model::EntityId;
use crate::repo::bug::{BugDetail, BugPatch, NewBug};
use crate::repo::file::NewStoredFile;
use crate::repo::RepoError;
use crate::service::FileDraft;
use crate::session::SessionFactory;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Transfer input for reporting a bug.
#[derive(Debug, Clone, Default)]
pub struct BugDraft {
    pub title: String,
    pub description: Option<String>,
    pub system_id: EntityId,
    pub campaign_run_id: Option<EntityId>,
    pub requirements: Vec<EntityId>,
}

#[derive(Debug)]
pub enum BugServiceError {
    BugNotFound(EntityId),
    Repo(RepoError),
}

impl Display for BugServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BugNotFound(id) => write!(f, "bug not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BugServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BugNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for BugServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

type ServiceResult<T> = Result<T, BugServiceError>;

pub struct BugService {
    sessions: SessionFactory,
}

impl BugService {
    pub fn new(sessions: SessionFactory) -> Self {
        Self { sessions }
    }

    /// Creates the bug and its initial history entry atomically.
    pub fn report_bug(
        &self,
        draft: &BugDraft,
        environment_id: EntityId,
        actor: &str,
    ) -> ServiceResult<BugDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let bugs = uow.bugs();
            let created = bugs.create(
                &NewBug {
                    title: draft.title.clone(),
                    description: draft.description.clone(),
                    system_id: draft.system_id,
                    campaign_run_id: draft.campaign_run_id,
                    file_id: None,
                    requirements: draft.requirements.clone(),
                },
                environment_id,
                actor,
            )?;
            bugs.append_history(created.bug.id, actor, "bug reported")?;
            let detail = bugs
                .get_with_relations(created.bug.id)?
                .ok_or_else(|| RepoError::not_found("bug", created.bug.id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    /// Applies a patch and logs `summary` to the bug history in the same
    /// transaction.
    pub fn update_bug(
        &self,
        id: EntityId,
        patch: &BugPatch,
        summary: &str,
        actor: &str,
    ) -> ServiceResult<BugDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let bugs = uow.bugs();
            bugs.update(id, patch, actor)?;
            bugs.append_history(id, actor, summary)?;
            let detail = bugs
                .get_with_relations(id)?
                .ok_or_else(|| RepoError::not_found("bug", id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    /// Convenience wrapper for status-only changes.
    pub fn change_status(
        &self,
        id: EntityId,
        status: BugStatus,
        actor: &str,
    ) -> ServiceResult<BugDetail> {
        self.update_bug(
            id,
            &BugPatch {
                status: Some(status),
                ..BugPatch::default()
            },
            &format!("status changed to {status:?}"),
            actor,
        )
    }

    /// Registers an evidence file and links it to the bug.
    pub fn attach_file(
        &self,
        id: EntityId,
        draft: &FileDraft,
        actor: &str,
    ) -> ServiceResult<BugDetail> {
        let detail = self.sessions.with_unit_of_work(|uow| {
            let bugs = uow.bugs();
            let bug = bugs
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("bug", id))?;
            let file = uow.files().create(
                &NewStoredFile {
                    owner_kind: draft.owner_kind,
                    filename: draft.filename.clone(),
                    mime_type: draft.mime_type.clone(),
                    size_bytes: draft.size_bytes,
                },
                bug.environment_id,
                actor,
            )?;
            bugs.update(
                id,
                &BugPatch {
                    file_id: Some(Some(file.id)),
                    ..BugPatch::default()
                },
                actor,
            )?;
            bugs.append_history(id, actor, &format!("file attached: {}", draft.filename))?;
            let detail = bugs
                .get_with_relations(id)?
                .ok_or_else(|| RepoError::not_found("bug", id))?;
            uow.commit()?;
            Ok(detail)
        })?;
        Ok(detail)
    }

    pub fn get_bug(&self, id: EntityId) -> ServiceResult<Option<BugDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.bugs().get_with_relations(id))?)
    }

    pub fn list_bugs(&self) -> ServiceResult<Vec<BugDetail>> {
        Ok(self
            .sessions
            .with_unit_of_work(|uow| uow.bugs().get_all_with_relations())?)
    }
}

impl Service for BugService {
    fn name(&self) -> &'static str {
        "bug_service"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
