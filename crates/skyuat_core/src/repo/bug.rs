//! Bug repository and its append-only history log.
//!
//! # Responsibility
//! - CRUD for bugs, their requirement association set, and the history
//!   change log.
//!
//! # Invariants
//! - History entries are append-only: this module exposes no update or
//!   delete for them; they cascade with the owning bug.
//! - The referenced system and campaign run are delete-restricted.

use crate::model::bug::{Bug, BugHistoryEntry, BugStatus};
use crate::model::lookup::System;
use crate::model::testplan::Requirement;
use crate::model::EntityId;
use crate::repo::lookup::SystemRepository;
use crate::repo::requirement::RequirementRepository;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, require_rows, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const BUG_SELECT_SQL: &str = "SELECT id, environment_id, title, description, status, system_id, \
     campaign_run_id, file_id, created_at, updated_at, modified_by FROM bugs";

/// Bug with associations and history eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugDetail {
    pub bug: Bug,
    pub system: System,
    pub requirements: Vec<Requirement>,
    pub history: Vec<BugHistoryEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct NewBug {
    pub title: String,
    pub description: Option<String>,
    pub system_id: EntityId,
    pub campaign_run_id: Option<EntityId>,
    pub file_id: Option<EntityId>,
    pub requirements: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct BugPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<BugStatus>,
    pub system_id: Option<EntityId>,
    pub campaign_run_id: Option<Option<EntityId>>,
    pub file_id: Option<Option<EntityId>>,
    pub requirements: Option<Vec<EntityId>>,
}

pub struct BugRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> BugRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Bug>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BUG_SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt
            .query_row([id], |row| Ok(parse_bug_row(row)))
            .optional()?;
        found.transpose()
    }

    pub fn get_all(&self) -> RepoResult<Vec<Bug>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BUG_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut bugs = Vec::new();
        while let Some(row) = rows.next()? {
            bugs.push(parse_bug_row(row)?);
        }
        Ok(bugs)
    }

    pub fn get_by_campaign_run(&self, campaign_run_id: EntityId) -> RepoResult<Vec<Bug>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BUG_SELECT_SQL} WHERE campaign_run_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([campaign_run_id])?;
        let mut bugs = Vec::new();
        while let Some(row) = rows.next()? {
            bugs.push(parse_bug_row(row)?);
        }
        Ok(bugs)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<BugDetail>> {
        let Some(bug) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(bug)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<BugDetail>> {
        self.get_all()?
            .into_iter()
            .map(|bug| self.hydrate(bug))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewBug,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<BugDetail> {
        validate_actor(modified_by)?;
        if input.title.trim().is_empty() {
            return Err(RepoError::Validation(
                "bug title must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "system", "systems", &[input.system_id])?;
        if let Some(campaign_run_id) = input.campaign_run_id {
            require_rows(self.conn, "campaign run", "campaign_runs", &[campaign_run_id])?;
        }
        if let Some(file_id) = input.file_id {
            require_rows(self.conn, "file", "files", &[file_id])?;
        }

        self.conn.execute(
            "INSERT INTO bugs (environment_id, title, description, status, system_id,
                 campaign_run_id, file_id, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                environment_id,
                input.title,
                input.description,
                status_to_db(BugStatus::Open),
                input.system_id,
                input.campaign_run_id,
                input.file_id,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_requirements(id, &input.requirements)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("bug", id))
    }

    pub fn update(&self, id: EntityId, patch: &BugPatch, modified_by: &str) -> RepoResult<BugDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("bug", id))?;

        let title = patch.title.clone().unwrap_or(current.title);
        let description = match &patch.description {
            Some(value) => value.clone(),
            None => current.description,
        };
        let status = patch.status.unwrap_or(current.status);
        let system_id = patch.system_id.unwrap_or(current.system_id);
        let campaign_run_id = patch.campaign_run_id.unwrap_or(current.campaign_run_id);
        let file_id = patch.file_id.unwrap_or(current.file_id);

        if patch.system_id.is_some() {
            require_rows(self.conn, "system", "systems", &[system_id])?;
        }
        if let Some(Some(run_id)) = patch.campaign_run_id {
            require_rows(self.conn, "campaign run", "campaign_runs", &[run_id])?;
        }
        if let Some(Some(new_file_id)) = patch.file_id {
            require_rows(self.conn, "file", "files", &[new_file_id])?;
        }

        self.conn.execute(
            "UPDATE bugs
             SET title = ?1,
                 description = ?2,
                 status = ?3,
                 system_id = ?4,
                 campaign_run_id = ?5,
                 file_id = ?6,
                 modified_by = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?8;",
            params![
                title,
                description,
                status_to_db(status),
                system_id,
                campaign_run_id,
                file_id,
                modified_by,
                id
            ],
        )?;

        if let Some(requirements) = &patch.requirements {
            self.replace_requirements(id, requirements)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("bug", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM bugs WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    /// Appends one history entry; entries are never updated or removed.
    pub fn append_history(
        &self,
        bug_id: EntityId,
        actor: &str,
        summary: &str,
    ) -> RepoResult<BugHistoryEntry> {
        validate_actor(actor)?;
        if summary.trim().is_empty() {
            return Err(RepoError::Validation(
                "history summary must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "bug", "bugs", &[bug_id])?;

        self.conn.execute(
            "INSERT INTO bug_history (bug_id, actor, summary) VALUES (?1, ?2, ?3);",
            params![bug_id, actor, summary],
        )?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self.conn.prepare(
            "SELECT id, bug_id, actor, summary, created_at FROM bug_history WHERE id = ?1;",
        )?;
        stmt.query_row([id], parse_history_row)
            .map_err(RepoError::from)
    }

    /// History entries of one bug, oldest first.
    pub fn history(&self, bug_id: EntityId) -> RepoResult<Vec<BugHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, bug_id, actor, summary, created_at
             FROM bug_history
             WHERE bug_id = ?1
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([bug_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }

    fn replace_requirements(&self, id: EntityId, requirements: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "bug_requirements",
            "bug_id",
            id,
            "requirement_id",
            "requirement",
            "requirements",
            requirements,
        )
    }

    fn hydrate(&self, bug: Bug) -> RepoResult<BugDetail> {
        let system = SystemRepository::new(self.conn)
            .get_by_id(bug.system_id)?
            .ok_or_else(|| RepoError::not_found("system", bug.system_id))?;
        let requirement_repo = RequirementRepository::new(self.conn);
        let requirements = linked_ids(
            self.conn,
            "bug_requirements",
            "bug_id",
            "requirement_id",
            bug.id,
        )?
        .into_iter()
        .map(|requirement_id| {
            requirement_repo
                .get_by_id(requirement_id)?
                .ok_or_else(|| RepoError::not_found("requirement", requirement_id))
        })
        .collect::<RepoResult<Vec<_>>>()?;
        let history = self.history(bug.id)?;

        Ok(BugDetail {
            bug,
            system,
            requirements,
            history,
        })
    }
}

fn status_to_db(status: BugStatus) -> &'static str {
    match status {
        BugStatus::Open => "open",
        BugStatus::InProgress => "in_progress",
        BugStatus::Resolved => "resolved",
        BugStatus::Closed => "closed",
    }
}

fn parse_status(value: &str) -> Option<BugStatus> {
    match value {
        "open" => Some(BugStatus::Open),
        "in_progress" => Some(BugStatus::InProgress),
        "resolved" => Some(BugStatus::Resolved),
        "closed" => Some(BugStatus::Closed),
        _ => None,
    }
}

fn parse_bug_row(row: &Row<'_>) -> RepoResult<Bug> {
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid bug status `{status_text}` in bugs.status"))
    })?;

    Ok(Bug {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        system_id: row.get("system_id")?,
        campaign_run_id: row.get("campaign_run_id")?,
        file_id: row.get("file_id")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_history_row(row: &Row<'_>) -> rusqlite::Result<BugHistoryEntry> {
    Ok(BugHistoryEntry {
        id: row.get("id")?,
        bug_id: row.get("bug_id")?,
        actor: row.get("actor")?,
        summary: row.get("summary")?,
        created_at: row.get("created_at")?,
    })
}
