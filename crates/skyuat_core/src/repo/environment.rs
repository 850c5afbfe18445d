//! Environment repository.
//!
//! # Responsibility
//! - CRUD for the isolation-boundary table every scoped entity hangs off.
//!
//! # Invariants
//! - Environment names are globally unique.
//! - Deleting an environment is restricted while any scoped entity exists.

use crate::model::environment::Environment;
use crate::model::EntityId;
use crate::repo::{audit_from_row, insert_or_fetch, validate_actor, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_SQL: &str = "SELECT id, name, description, created_at, updated_at, modified_by
FROM environments";

/// Create payload for an environment.
#[derive(Debug, Clone, Default)]
pub struct NewEnvironment {
    pub name: String,
    pub description: Option<String>,
}

/// Partial update payload; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

pub struct EnvironmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EnvironmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Environment>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt
            .query_row([id], parse_environment_row)
            .optional()?;
        Ok(found)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Environment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut environments = Vec::new();
        while let Some(row) = rows.next()? {
            environments.push(parse_environment_row(row)?);
        }
        Ok(environments)
    }

    pub fn get_by_name(&self, name: &str) -> RepoResult<Option<Environment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SQL} WHERE name = ?1;"))?;
        let found = stmt
            .query_row([name], parse_environment_row)
            .optional()?;
        Ok(found)
    }

    pub fn create(&self, input: &NewEnvironment, modified_by: &str) -> RepoResult<Environment> {
        validate_actor(modified_by)?;
        if input.name.trim().is_empty() {
            return Err(RepoError::Validation(
                "environment name must not be empty".to_string(),
            ));
        }

        self.conn.execute(
            "INSERT INTO environments (name, description, modified_by) VALUES (?1, ?2, ?3);",
            params![input.name, input.description, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("environment", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &EnvironmentPatch,
        modified_by: &str,
    ) -> RepoResult<Environment> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("environment", id))?;

        let name = patch.name.clone().unwrap_or(current.name);
        let description = match &patch.description {
            Some(value) => value.clone(),
            None => current.description,
        };

        self.conn.execute(
            "UPDATE environments
             SET name = ?1,
                 description = ?2,
                 modified_by = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?4;",
            params![name, description, modified_by, id],
        )?;
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("environment", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM environments WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    /// Insert-first create-or-get by name.
    pub fn get_or_create(
        &self,
        name: &str,
        modified_by: &str,
    ) -> RepoResult<(Environment, bool)> {
        insert_or_fetch(
            "environment",
            || {
                self.create(
                    &NewEnvironment {
                        name: name.to_string(),
                        description: None,
                    },
                    modified_by,
                )
            },
            || self.get_by_name(name),
        )
    }
}

fn parse_environment_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        audit: audit_from_row(row)?,
    })
}
