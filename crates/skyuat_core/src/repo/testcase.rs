//! Test case and step repositories.
//!
//! # Responsibility
//! - CRUD for cases, their six association sets, and their ordered steps.
//! - Step ordering (`position`) management including reordering.
//!
//! # Invariants
//! - `Case.code` is unique per environment.
//! - Steps cascade with their case; step order is `position ASC, id ASC`.
//! - Association updates replace the full set.

use crate::model::fleet::{Drone, Operator};
use crate::model::lookup::{Section, System};
use crate::model::testplan::{Case, Requirement, Step};
use crate::model::uhub::UhubUser;
use crate::model::zone::UasZone;
use crate::model::EntityId;
use crate::repo::fleet::{DroneRepository, OperatorRepository};
use crate::repo::lookup::{SectionRepository, SystemRepository};
use crate::repo::requirement::RequirementRepository;
use crate::repo::uhub::UhubUserRepository;
use crate::repo::zone::UasZoneRepository;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, require_rows, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CASE_SELECT_SQL: &str = "SELECT id, environment_id, code, title, description, \
     created_at, updated_at, modified_by FROM cases";
const STEP_SELECT_SQL: &str = "SELECT id, case_id, position, action, expected_result, \
     created_at, updated_at, modified_by FROM steps";

/// Case with association sets and ordered steps eager-loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseDetail {
    pub case: Case,
    pub systems: Vec<System>,
    pub sections: Vec<Section>,
    pub operators: Vec<Operator>,
    pub drones: Vec<Drone>,
    pub uhub_users: Vec<UhubUser>,
    pub uas_zones: Vec<UasZone>,
    pub steps: Vec<Step>,
}

/// Step with its requirement links eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDetail {
    pub step: Step,
    pub requirements: Vec<Requirement>,
}

/// Create payload for a case.
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub systems: Vec<EntityId>,
    pub sections: Vec<EntityId>,
    pub operators: Vec<EntityId>,
    pub drones: Vec<EntityId>,
    pub uhub_users: Vec<EntityId>,
    pub uas_zones: Vec<EntityId>,
}

/// Partial update for a case.
#[derive(Debug, Clone, Default)]
pub struct CasePatch {
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub systems: Option<Vec<EntityId>>,
    pub sections: Option<Vec<EntityId>>,
    pub operators: Option<Vec<EntityId>>,
    pub drones: Option<Vec<EntityId>>,
    pub uhub_users: Option<Vec<EntityId>>,
    pub uas_zones: Option<Vec<EntityId>>,
}

/// Create payload for a step. `position = None` appends after the last
/// existing step of the case.
#[derive(Debug, Clone, Default)]
pub struct NewStep {
    pub position: Option<i64>,
    pub action: String,
    pub expected_result: Option<String>,
    pub requirements: Vec<EntityId>,
}

/// Partial update for a step.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub position: Option<i64>,
    pub action: Option<String>,
    pub expected_result: Option<Option<String>>,
    pub requirements: Option<Vec<EntityId>>,
}

pub struct CaseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CaseRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_case_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_SELECT_SQL} ORDER BY code ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut cases = Vec::new();
        while let Some(row) = rows.next()? {
            cases.push(parse_case_row(row)?);
        }
        Ok(cases)
    }

    pub fn get_by_code(&self, environment_id: EntityId, code: &str) -> RepoResult<Option<Case>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CASE_SELECT_SQL} WHERE environment_id = ?1 AND code = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, code], parse_case_row)
            .optional()?)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<CaseDetail>> {
        let Some(case) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(case)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<CaseDetail>> {
        self.get_all()?
            .into_iter()
            .map(|case| self.hydrate(case))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewCase,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<CaseDetail> {
        validate_actor(modified_by)?;
        if input.code.trim().is_empty() {
            return Err(RepoError::Validation(
                "case code must not be empty".to_string(),
            ));
        }
        if input.title.trim().is_empty() {
            return Err(RepoError::Validation(
                "case title must not be empty".to_string(),
            ));
        }

        self.conn.execute(
            "INSERT INTO cases (environment_id, code, title, description, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                environment_id,
                input.code,
                input.title,
                input.description,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_associations(
            id,
            &CasePatch {
                systems: Some(input.systems.clone()),
                sections: Some(input.sections.clone()),
                operators: Some(input.operators.clone()),
                drones: Some(input.drones.clone()),
                uhub_users: Some(input.uhub_users.clone()),
                uas_zones: Some(input.uas_zones.clone()),
                ..CasePatch::default()
            },
        )?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("case", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &CasePatch,
        modified_by: &str,
    ) -> RepoResult<CaseDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("case", id))?;

        let code = patch.code.clone().unwrap_or(current.code);
        let title = patch.title.clone().unwrap_or(current.title);
        let description = match &patch.description {
            Some(value) => value.clone(),
            None => current.description,
        };

        self.conn.execute(
            "UPDATE cases
             SET code = ?1,
                 title = ?2,
                 description = ?3,
                 modified_by = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![code, title, description, modified_by, id],
        )?;

        self.replace_associations(id, patch)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("case", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM cases WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn replace_associations(&self, id: EntityId, patch: &CasePatch) -> RepoResult<()> {
        if let Some(systems) = &patch.systems {
            replace_links(
                self.conn,
                "case_systems",
                "case_id",
                id,
                "system_id",
                "system",
                "systems",
                systems,
            )?;
        }
        if let Some(sections) = &patch.sections {
            replace_links(
                self.conn,
                "case_sections",
                "case_id",
                id,
                "section_id",
                "section",
                "sections",
                sections,
            )?;
        }
        if let Some(operators) = &patch.operators {
            replace_links(
                self.conn,
                "case_operators",
                "case_id",
                id,
                "operator_id",
                "operator",
                "operators",
                operators,
            )?;
        }
        if let Some(drones) = &patch.drones {
            replace_links(
                self.conn,
                "case_drones",
                "case_id",
                id,
                "drone_id",
                "drone",
                "drones",
                drones,
            )?;
        }
        if let Some(uhub_users) = &patch.uhub_users {
            replace_links(
                self.conn,
                "case_uhub_users",
                "case_id",
                id,
                "uhub_user_id",
                "uhub user",
                "uhub_users",
                uhub_users,
            )?;
        }
        if let Some(uas_zones) = &patch.uas_zones {
            replace_links(
                self.conn,
                "case_uas_zones",
                "case_id",
                id,
                "uas_zone_id",
                "uas zone",
                "uas_zones",
                uas_zones,
            )?;
        }
        Ok(())
    }

    fn hydrate(&self, case: Case) -> RepoResult<CaseDetail> {
        let case_id = case.id;
        let systems = self.load_linked(case_id, "case_systems", "system_id", |id| {
            SystemRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("system", id))
        })?;
        let sections = self.load_linked(case_id, "case_sections", "section_id", |id| {
            SectionRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("section", id))
        })?;
        let operators = self.load_linked(case_id, "case_operators", "operator_id", |id| {
            OperatorRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("operator", id))
        })?;
        let drones = self.load_linked(case_id, "case_drones", "drone_id", |id| {
            DroneRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("drone", id))
        })?;
        let uhub_users = self.load_linked(case_id, "case_uhub_users", "uhub_user_id", |id| {
            UhubUserRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("uhub user", id))
        })?;
        let uas_zones = self.load_linked(case_id, "case_uas_zones", "uas_zone_id", |id| {
            UasZoneRepository::new(self.conn)
                .get_by_id(id)?
                .ok_or_else(|| RepoError::not_found("uas zone", id))
        })?;
        let steps = StepRepository::new(self.conn).get_by_case(case_id)?;

        Ok(CaseDetail {
            case,
            systems,
            sections,
            operators,
            drones,
            uhub_users,
            uas_zones,
            steps,
        })
    }

    fn load_linked<T>(
        &self,
        case_id: EntityId,
        join_table: &str,
        target_col: &str,
        load: impl Fn(EntityId) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        linked_ids(self.conn, join_table, "case_id", target_col, case_id)?
            .into_iter()
            .map(load)
            .collect()
    }
}

pub struct StepRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> StepRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Step>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STEP_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_step_row).optional()?)
    }

    pub fn get_by_case(&self, case_id: EntityId) -> RepoResult<Vec<Step>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STEP_SELECT_SQL} WHERE case_id = ?1 ORDER BY position ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([case_id])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            steps.push(parse_step_row(row)?);
        }
        Ok(steps)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<StepDetail>> {
        let Some(step) = self.get_by_id(id)? else {
            return Ok(None);
        };
        let requirement_repo = RequirementRepository::new(self.conn);
        let requirements = linked_ids(
            self.conn,
            "step_requirements",
            "step_id",
            "requirement_id",
            id,
        )?
        .into_iter()
        .map(|requirement_id| {
            requirement_repo
                .get_by_id(requirement_id)?
                .ok_or_else(|| RepoError::not_found("requirement", requirement_id))
        })
        .collect::<RepoResult<Vec<_>>>()?;
        Ok(Some(StepDetail { step, requirements }))
    }

    pub fn create(
        &self,
        case_id: EntityId,
        input: &NewStep,
        modified_by: &str,
    ) -> RepoResult<StepDetail> {
        validate_actor(modified_by)?;
        if input.action.trim().is_empty() {
            return Err(RepoError::Validation(
                "step action must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "case", "cases", &[case_id])?;

        let position = match input.position {
            Some(position) => position,
            None => self.next_position(case_id)?,
        };

        self.conn.execute(
            "INSERT INTO steps (case_id, position, action, expected_result, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                case_id,
                position,
                input.action,
                input.expected_result,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_requirements(id, &input.requirements)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("step", id))
    }

    pub fn update(&self, id: EntityId, patch: &StepPatch, modified_by: &str) -> RepoResult<StepDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("step", id))?;

        let position = patch.position.unwrap_or(current.position);
        let action = patch.action.clone().unwrap_or(current.action);
        let expected_result = match &patch.expected_result {
            Some(value) => value.clone(),
            None => current.expected_result,
        };

        self.conn.execute(
            "UPDATE steps
             SET position = ?1,
                 action = ?2,
                 expected_result = ?3,
                 modified_by = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![position, action, expected_result, modified_by, id],
        )?;

        if let Some(requirements) = &patch.requirements {
            self.replace_requirements(id, requirements)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("step", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM steps WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    /// Rewrites step positions of a case to match `ordered_step_ids`.
    ///
    /// The id list must be exactly the case's current step set.
    pub fn reorder(
        &self,
        case_id: EntityId,
        ordered_step_ids: &[EntityId],
        modified_by: &str,
    ) -> RepoResult<Vec<Step>> {
        validate_actor(modified_by)?;
        let current = self.get_by_case(case_id)?;
        let mut current_ids: Vec<EntityId> = current.iter().map(|step| step.id).collect();
        let mut requested: Vec<EntityId> = ordered_step_ids.to_vec();
        current_ids.sort_unstable();
        requested.sort_unstable();
        if current_ids != requested {
            return Err(RepoError::Validation(
                "reorder list must contain exactly the case's steps".to_string(),
            ));
        }

        for (index, step_id) in ordered_step_ids.iter().enumerate() {
            self.conn.execute(
                "UPDATE steps
                 SET position = ?1,
                     modified_by = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?3;",
                params![(index + 1) as i64, modified_by, step_id],
            )?;
        }
        self.get_by_case(case_id)
    }

    fn next_position(&self, case_id: EntityId) -> RepoResult<i64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(position) FROM steps WHERE case_id = ?1;",
            [case_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    fn replace_requirements(&self, id: EntityId, requirements: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "step_requirements",
            "step_id",
            id,
            "requirement_id",
            "requirement",
            "requirements",
            requirements,
        )
    }
}

fn parse_case_row(row: &Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        code: row.get("code")?,
        title: row.get("title")?,
        description: row.get("description")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_step_row(row: &Row<'_>) -> rusqlite::Result<Step> {
    Ok(Step {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        position: row.get("position")?,
        action: row.get("action")?,
        expected_result: row.get("expected_result")?,
        audit: audit_from_row(row)?,
    })
}
