//! Fleet repositories: emails, operators, drones.
//!
//! # Responsibility
//! - Persistence for the Email → Operator → Drone ownership chain.
//! - Email address format validation before any write.
//!
//! # Invariants
//! - `emails.address` is unique per environment.
//! - Deleting an email referenced by an operator, or an operator referenced
//!   by a drone, surfaces the store's foreign-key integrity error.

use crate::model::fleet::{Drone, Email, Operator};
use crate::model::EntityId;
use crate::repo::{audit_from_row, require_rows, validate_actor, RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const EMAIL_SELECT_SQL: &str =
    "SELECT id, environment_id, address, created_at, updated_at, modified_by FROM emails";
const OPERATOR_SELECT_SQL: &str = "SELECT id, environment_id, name, email_id, easa_id, \
     created_at, updated_at, modified_by FROM operators";
const DRONE_SELECT_SQL: &str = "SELECT id, environment_id, name, serial_number, operator_id, \
     created_at, updated_at, modified_by FROM drones";

/// Create payload for an email row.
#[derive(Debug, Clone, Default)]
pub struct NewEmail {
    pub address: String,
}

/// Create payload for an operator.
#[derive(Debug, Clone, Default)]
pub struct NewOperator {
    pub name: String,
    pub email_id: EntityId,
    pub easa_id: Option<String>,
}

/// Partial update for an operator; `None` preserves the current value,
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct OperatorPatch {
    pub name: Option<String>,
    pub email_id: Option<EntityId>,
    pub easa_id: Option<Option<String>>,
}

/// Create payload for a drone.
#[derive(Debug, Clone, Default)]
pub struct NewDrone {
    pub name: String,
    pub serial_number: Option<String>,
    pub operator_id: EntityId,
}

/// Partial update for a drone.
#[derive(Debug, Clone, Default)]
pub struct DronePatch {
    pub name: Option<String>,
    pub serial_number: Option<Option<String>>,
    pub operator_id: Option<EntityId>,
}

pub struct EmailRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EmailRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Email>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EMAIL_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_email_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Email>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EMAIL_SELECT_SQL} ORDER BY address ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut emails = Vec::new();
        while let Some(row) = rows.next()? {
            emails.push(parse_email_row(row)?);
        }
        Ok(emails)
    }

    pub fn get_by_address(
        &self,
        environment_id: EntityId,
        address: &str,
    ) -> RepoResult<Option<Email>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EMAIL_SELECT_SQL} WHERE environment_id = ?1 AND address = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, address], parse_email_row)
            .optional()?)
    }

    pub fn create(
        &self,
        input: &NewEmail,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<Email> {
        validate_actor(modified_by)?;
        validate_address(&input.address)?;

        self.conn.execute(
            "INSERT INTO emails (environment_id, address, modified_by) VALUES (?1, ?2, ?3);",
            params![environment_id, input.address, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("email", id))
    }

    pub fn update(&self, id: EntityId, address: &str, modified_by: &str) -> RepoResult<Email> {
        validate_actor(modified_by)?;
        validate_address(address)?;

        let changed = self.conn.execute(
            "UPDATE emails
             SET address = ?1,
                 modified_by = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?3;",
            params![address, modified_by, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("email", id));
        }
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("email", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM emails WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

pub struct OperatorRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> OperatorRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Operator>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{OPERATOR_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_operator_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Operator>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{OPERATOR_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut operators = Vec::new();
        while let Some(row) = rows.next()? {
            operators.push(parse_operator_row(row)?);
        }
        Ok(operators)
    }

    pub fn get_by_name(
        &self,
        environment_id: EntityId,
        name: &str,
    ) -> RepoResult<Option<Operator>> {
        let mut stmt = self.conn.prepare(&format!(
            "{OPERATOR_SELECT_SQL} WHERE environment_id = ?1 AND name = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, name], parse_operator_row)
            .optional()?)
    }

    pub fn create(
        &self,
        input: &NewOperator,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<Operator> {
        validate_actor(modified_by)?;
        if input.name.trim().is_empty() {
            return Err(RepoError::Validation(
                "operator name must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "email", "emails", &[input.email_id])?;

        self.conn.execute(
            "INSERT INTO operators (environment_id, name, email_id, easa_id, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                environment_id,
                input.name,
                input.email_id,
                input.easa_id,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("operator", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &OperatorPatch,
        modified_by: &str,
    ) -> RepoResult<Operator> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("operator", id))?;

        let name = patch.name.clone().unwrap_or(current.name);
        let email_id = patch.email_id.unwrap_or(current.email_id);
        let easa_id = match &patch.easa_id {
            Some(value) => value.clone(),
            None => current.easa_id,
        };
        if patch.email_id.is_some() {
            require_rows(self.conn, "email", "emails", &[email_id])?;
        }

        self.conn.execute(
            "UPDATE operators
             SET name = ?1,
                 email_id = ?2,
                 easa_id = ?3,
                 modified_by = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![name, email_id, easa_id, modified_by, id],
        )?;
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("operator", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM operators WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

pub struct DroneRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> DroneRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Drone>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DRONE_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_drone_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Drone>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DRONE_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut drones = Vec::new();
        while let Some(row) = rows.next()? {
            drones.push(parse_drone_row(row)?);
        }
        Ok(drones)
    }

    pub fn get_by_name(&self, environment_id: EntityId, name: &str) -> RepoResult<Option<Drone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DRONE_SELECT_SQL} WHERE environment_id = ?1 AND name = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, name], parse_drone_row)
            .optional()?)
    }

    pub fn get_by_operator(&self, operator_id: EntityId) -> RepoResult<Vec<Drone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DRONE_SELECT_SQL} WHERE operator_id = ?1 ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([operator_id])?;
        let mut drones = Vec::new();
        while let Some(row) = rows.next()? {
            drones.push(parse_drone_row(row)?);
        }
        Ok(drones)
    }

    pub fn create(
        &self,
        input: &NewDrone,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<Drone> {
        validate_actor(modified_by)?;
        if input.name.trim().is_empty() {
            return Err(RepoError::Validation(
                "drone name must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "operator", "operators", &[input.operator_id])?;

        self.conn.execute(
            "INSERT INTO drones (environment_id, name, serial_number, operator_id, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                environment_id,
                input.name,
                input.serial_number,
                input.operator_id,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("drone", id))
    }

    pub fn update(&self, id: EntityId, patch: &DronePatch, modified_by: &str) -> RepoResult<Drone> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("drone", id))?;

        let name = patch.name.clone().unwrap_or(current.name);
        let serial_number = match &patch.serial_number {
            Some(value) => value.clone(),
            None => current.serial_number,
        };
        let operator_id = patch.operator_id.unwrap_or(current.operator_id);
        if patch.operator_id.is_some() {
            require_rows(self.conn, "operator", "operators", &[operator_id])?;
        }

        self.conn.execute(
            "UPDATE drones
             SET name = ?1,
                 serial_number = ?2,
                 operator_id = ?3,
                 modified_by = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![name, serial_number, operator_id, modified_by, id],
        )?;
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("drone", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM drones WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

fn validate_address(address: &str) -> RepoResult<()> {
    if !EMAIL_RE.is_match(address.trim()) {
        return Err(RepoError::Validation(format!(
            "invalid email address: `{address}`"
        )));
    }
    Ok(())
}

fn parse_email_row(row: &Row<'_>) -> rusqlite::Result<Email> {
    Ok(Email {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        address: row.get("address")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_operator_row(row: &Row<'_>) -> rusqlite::Result<Operator> {
    Ok(Operator {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        name: row.get("name")?,
        email_id: row.get("email_id")?,
        easa_id: row.get("easa_id")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_drone_row(row: &Row<'_>) -> rusqlite::Result<Drone> {
    Ok(Drone {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        name: row.get("name")?,
        serial_number: row.get("serial_number")?,
        operator_id: row.get("operator_id")?,
        audit: audit_from_row(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::validate_address;

    #[test]
    fn address_format_is_checked() {
        assert!(validate_address("pilot@example.com").is_ok());
        assert!(validate_address("not-an-address").is_err());
        assert!(validate_address("two@@example.com").is_err());
    }
}
