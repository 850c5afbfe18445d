//! Execution-run repositories: campaign runs, case runs, step runs.
//!
//! # Responsibility
//! - Persistence for the snapshot chain created when a campaign is
//!   executed.
//!
//! # Invariants
//! - Case runs cascade with their campaign run; step runs cascade with
//!   their case run.
//! - Referenced plan rows (campaign, case, step) are delete-restricted
//!   while runs exist.
//! - A step run starts `pending` and records exactly one outcome at a
//!   time; re-recording overwrites outcome, note and file.

use crate::model::campaign::{CampaignRun, CaseRun, StepOutcome, StepRun};
use crate::model::EntityId;
use crate::repo::{audit_from_row, require_rows, validate_actor, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CAMPAIGN_RUN_SELECT_SQL: &str = "SELECT id, environment_id, campaign_id, started_at, \
     finished_at, created_at, updated_at, modified_by FROM campaign_runs";
const CASE_RUN_SELECT_SQL: &str = "SELECT id, campaign_run_id, case_id, \
     created_at, updated_at, modified_by FROM case_runs";
const STEP_RUN_SELECT_SQL: &str = "SELECT id, case_run_id, step_id, outcome, note, file_id, \
     created_at, updated_at, modified_by FROM step_runs";

/// Case run with its step runs eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRunDetail {
    pub case_run: CaseRun,
    pub step_runs: Vec<StepRun>,
}

/// Campaign run with the full snapshot tree eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRunDetail {
    pub run: CampaignRun,
    pub case_runs: Vec<CaseRunDetail>,
}

pub struct CampaignRunRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CampaignRunRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<CampaignRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAMPAIGN_RUN_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_campaign_run_row).optional()?)
    }

    pub fn get_by_campaign(&self, campaign_id: EntityId) -> RepoResult<Vec<CampaignRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CAMPAIGN_RUN_SELECT_SQL} WHERE campaign_id = ?1 ORDER BY started_at DESC, id DESC;"
        ))?;
        let mut rows = stmt.query([campaign_id])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(parse_campaign_run_row(row)?);
        }
        Ok(runs)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<CampaignRunDetail>> {
        let Some(run) = self.get_by_id(id)? else {
            return Ok(None);
        };
        let case_run_repo = CaseRunRepository::new(self.conn);
        let step_run_repo = StepRunRepository::new(self.conn);
        let case_runs = case_run_repo
            .get_by_campaign_run(id)?
            .into_iter()
            .map(|case_run| {
                let step_runs = step_run_repo.get_by_case_run(case_run.id)?;
                Ok(CaseRunDetail {
                    case_run,
                    step_runs,
                })
            })
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(Some(CampaignRunDetail { run, case_runs }))
    }

    pub fn create(
        &self,
        campaign_id: EntityId,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<CampaignRun> {
        validate_actor(modified_by)?;
        require_rows(self.conn, "campaign", "campaigns", &[campaign_id])?;

        self.conn.execute(
            "INSERT INTO campaign_runs (environment_id, campaign_id, modified_by)
             VALUES (?1, ?2, ?3);",
            params![environment_id, campaign_id, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("campaign run", id))
    }

    /// Stamps `finished_at`. Finishing twice refreshes the timestamp;
    /// a missing run is a not-found error.
    pub fn finish(&self, id: EntityId, modified_by: &str) -> RepoResult<CampaignRun> {
        validate_actor(modified_by)?;
        let changed = self.conn.execute(
            "UPDATE campaign_runs
             SET finished_at = (strftime('%s', 'now') * 1000),
                 modified_by = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![modified_by, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("campaign run", id));
        }
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("campaign run", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM campaign_runs WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

pub struct CaseRunRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CaseRunRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<CaseRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_RUN_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_case_run_row).optional()?)
    }

    pub fn get_by_campaign_run(&self, campaign_run_id: EntityId) -> RepoResult<Vec<CaseRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CASE_RUN_SELECT_SQL} WHERE campaign_run_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([campaign_run_id])?;
        let mut case_runs = Vec::new();
        while let Some(row) = rows.next()? {
            case_runs.push(parse_case_run_row(row)?);
        }
        Ok(case_runs)
    }

    pub fn create(
        &self,
        campaign_run_id: EntityId,
        case_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<CaseRun> {
        validate_actor(modified_by)?;
        require_rows(self.conn, "campaign run", "campaign_runs", &[campaign_run_id])?;
        require_rows(self.conn, "case", "cases", &[case_id])?;

        self.conn.execute(
            "INSERT INTO case_runs (campaign_run_id, case_id, modified_by) VALUES (?1, ?2, ?3);",
            params![campaign_run_id, case_id, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("case run", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM case_runs WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

pub struct StepRunRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> StepRunRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<StepRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STEP_RUN_SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt
            .query_row([id], |row| Ok(parse_step_run_row(row)))
            .optional()?;
        found.transpose()
    }

    pub fn get_by_case_run(&self, case_run_id: EntityId) -> RepoResult<Vec<StepRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STEP_RUN_SELECT_SQL} WHERE case_run_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([case_run_id])?;
        let mut step_runs = Vec::new();
        while let Some(row) = rows.next()? {
            step_runs.push(parse_step_run_row(row)?);
        }
        Ok(step_runs)
    }

    /// Creates a pending step run inside a case run snapshot.
    pub fn create(
        &self,
        case_run_id: EntityId,
        step_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<StepRun> {
        validate_actor(modified_by)?;
        require_rows(self.conn, "case run", "case_runs", &[case_run_id])?;
        require_rows(self.conn, "step", "steps", &[step_id])?;

        self.conn.execute(
            "INSERT INTO step_runs (case_run_id, step_id, modified_by) VALUES (?1, ?2, ?3);",
            params![case_run_id, step_id, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("step run", id))
    }

    /// Records the outcome of one step run, replacing note and file link.
    pub fn record_outcome(
        &self,
        id: EntityId,
        outcome: StepOutcome,
        note: Option<&str>,
        file_id: Option<EntityId>,
        modified_by: &str,
    ) -> RepoResult<StepRun> {
        validate_actor(modified_by)?;
        if let Some(file_id) = file_id {
            require_rows(self.conn, "file", "files", &[file_id])?;
        }

        let changed = self.conn.execute(
            "UPDATE step_runs
             SET outcome = ?1,
                 note = ?2,
                 file_id = ?3,
                 modified_by = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![outcome_to_db(outcome), note, file_id, modified_by, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("step run", id));
        }
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("step run", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM step_runs WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

fn outcome_to_db(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Pending => "pending",
        StepOutcome::Passed => "passed",
        StepOutcome::Failed => "failed",
    }
}

fn parse_outcome(value: &str) -> Option<StepOutcome> {
    match value {
        "pending" => Some(StepOutcome::Pending),
        "passed" => Some(StepOutcome::Passed),
        "failed" => Some(StepOutcome::Failed),
        _ => None,
    }
}

fn parse_campaign_run_row(row: &Row<'_>) -> rusqlite::Result<CampaignRun> {
    Ok(CampaignRun {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        campaign_id: row.get("campaign_id")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_case_run_row(row: &Row<'_>) -> rusqlite::Result<CaseRun> {
    Ok(CaseRun {
        id: row.get("id")?,
        campaign_run_id: row.get("campaign_run_id")?,
        case_id: row.get("case_id")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_step_run_row(row: &Row<'_>) -> RepoResult<StepRun> {
    let outcome_text: String = row.get("outcome")?;
    let outcome = parse_outcome(&outcome_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid outcome `{outcome_text}` in step_runs.outcome"
        ))
    })?;

    Ok(StepRun {
        id: row.get("id")?,
        case_run_id: row.get("case_run_id")?,
        step_id: row.get("step_id")?,
        outcome,
        note: row.get("note")?,
        file_id: row.get("file_id")?,
        audit: audit_from_row(row)?,
    })
}
