//! Requirement repository.
//!
//! # Responsibility
//! - CRUD for requirements plus wholesale replacement of the system and
//!   section association sets.
//!
//! # Invariants
//! - `code` is unique per environment.
//! - A requirement references at least one system and at least one section;
//!   enforced whenever the field is present at create/update.
//! - Step and bug links are owned by the step/bug side; this repository
//!   only reads them for hydration.

use crate::model::lookup::{Section, System};
use crate::model::testplan::Requirement;
use crate::model::EntityId;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REQUIREMENT_SELECT_SQL: &str = "SELECT id, environment_id, code, definition, \
     created_at, updated_at, modified_by FROM requirements";

/// Requirement with association sets eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementDetail {
    pub requirement: Requirement,
    pub systems: Vec<System>,
    pub sections: Vec<Section>,
    /// Steps verifying this requirement (link owned by the step side).
    pub step_ids: Vec<EntityId>,
    /// Bugs traced to this requirement (link owned by the bug side).
    pub bug_ids: Vec<EntityId>,
}

/// Create payload for a requirement.
#[derive(Debug, Clone, Default)]
pub struct NewRequirement {
    pub code: String,
    pub definition: String,
    pub systems: Vec<EntityId>,
    pub sections: Vec<EntityId>,
}

/// Partial update; association fields present in the patch replace the
/// full set and must keep the minimum cardinality.
#[derive(Debug, Clone, Default)]
pub struct RequirementPatch {
    pub code: Option<String>,
    pub definition: Option<String>,
    pub systems: Option<Vec<EntityId>>,
    pub sections: Option<Vec<EntityId>>,
}

pub struct RequirementRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> RequirementRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Requirement>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REQUIREMENT_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_requirement_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Requirement>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REQUIREMENT_SELECT_SQL} ORDER BY code ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut requirements = Vec::new();
        while let Some(row) = rows.next()? {
            requirements.push(parse_requirement_row(row)?);
        }
        Ok(requirements)
    }

    pub fn get_by_code(
        &self,
        environment_id: EntityId,
        code: &str,
    ) -> RepoResult<Option<Requirement>> {
        let mut stmt = self.conn.prepare(&format!(
            "{REQUIREMENT_SELECT_SQL} WHERE environment_id = ?1 AND code = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, code], parse_requirement_row)
            .optional()?)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<RequirementDetail>> {
        let Some(requirement) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(requirement)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<RequirementDetail>> {
        self.get_all()?
            .into_iter()
            .map(|requirement| self.hydrate(requirement))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewRequirement,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<RequirementDetail> {
        validate_actor(modified_by)?;
        if input.code.trim().is_empty() {
            return Err(RepoError::Validation(
                "requirement code must not be empty".to_string(),
            ));
        }
        if input.definition.trim().is_empty() {
            return Err(RepoError::Validation(
                "requirement definition must not be empty".to_string(),
            ));
        }
        validate_min_cardinality(&input.systems, &input.sections)?;

        self.conn.execute(
            "INSERT INTO requirements (environment_id, code, definition, modified_by)
             VALUES (?1, ?2, ?3, ?4);",
            params![environment_id, input.code, input.definition, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_systems(id, &input.systems)?;
        self.replace_sections(id, &input.sections)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("requirement", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &RequirementPatch,
        modified_by: &str,
    ) -> RepoResult<RequirementDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("requirement", id))?;

        if let Some(systems) = &patch.systems {
            if systems.is_empty() {
                return Err(RepoError::Validation(
                    "requirement must reference at least one system".to_string(),
                ));
            }
        }
        if let Some(sections) = &patch.sections {
            if sections.is_empty() {
                return Err(RepoError::Validation(
                    "requirement must reference at least one section".to_string(),
                ));
            }
        }

        let code = patch.code.clone().unwrap_or(current.code);
        let definition = patch.definition.clone().unwrap_or(current.definition);

        self.conn.execute(
            "UPDATE requirements
             SET code = ?1,
                 definition = ?2,
                 modified_by = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?4;",
            params![code, definition, modified_by, id],
        )?;

        if let Some(systems) = &patch.systems {
            self.replace_systems(id, systems)?;
        }
        if let Some(sections) = &patch.sections {
            self.replace_sections(id, sections)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("requirement", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM requirements WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn replace_systems(&self, id: EntityId, systems: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "requirement_systems",
            "requirement_id",
            id,
            "system_id",
            "system",
            "systems",
            systems,
        )
    }

    fn replace_sections(&self, id: EntityId, sections: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "requirement_sections",
            "requirement_id",
            id,
            "section_id",
            "section",
            "sections",
            sections,
        )
    }

    fn hydrate(&self, requirement: Requirement) -> RepoResult<RequirementDetail> {
        let systems = self.load_lookups(
            "SELECT s.id, s.name, s.description
             FROM requirement_systems rs
             INNER JOIN systems s ON s.id = rs.system_id
             WHERE rs.requirement_id = ?1
             ORDER BY s.name ASC;",
            requirement.id,
        )?;
        let sections = self.load_lookups(
            "SELECT s.id, s.name, s.description
             FROM requirement_sections rs
             INNER JOIN sections s ON s.id = rs.section_id
             WHERE rs.requirement_id = ?1
             ORDER BY s.name ASC;",
            requirement.id,
        )?;
        let step_ids = linked_ids(
            self.conn,
            "step_requirements",
            "requirement_id",
            "step_id",
            requirement.id,
        )?;
        let bug_ids = linked_ids(
            self.conn,
            "bug_requirements",
            "requirement_id",
            "bug_id",
            requirement.id,
        )?;

        Ok(RequirementDetail {
            requirement,
            systems: systems
                .into_iter()
                .map(|(id, name, description)| System {
                    id,
                    name,
                    description,
                })
                .collect(),
            sections: sections
                .into_iter()
                .map(|(id, name, description)| Section {
                    id,
                    name,
                    description,
                })
                .collect(),
            step_ids,
            bug_ids,
        })
    }

    fn load_lookups(
        &self,
        sql: &str,
        id: EntityId,
    ) -> RepoResult<Vec<(EntityId, String, Option<String>)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push((row.get(0)?, row.get(1)?, row.get(2)?));
        }
        Ok(entries)
    }
}

fn validate_min_cardinality(systems: &[EntityId], sections: &[EntityId]) -> RepoResult<()> {
    if systems.is_empty() {
        return Err(RepoError::Validation(
            "requirement must reference at least one system".to_string(),
        ));
    }
    if sections.is_empty() {
        return Err(RepoError::Validation(
            "requirement must reference at least one section".to_string(),
        ));
    }
    Ok(())
}

fn parse_requirement_row(row: &Row<'_>) -> rusqlite::Result<Requirement> {
    Ok(Requirement {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        code: row.get("code")?,
        definition: row.get("definition")?,
        audit: audit_from_row(row)?,
    })
}
