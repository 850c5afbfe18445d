//! U-hub organization and user repositories.
//!
//! # Invariants
//! - Organization names and usernames are unique per environment.
//! - An organization is delete-restricted while users belong to it.

use crate::model::uhub::{UhubOrg, UhubUser};
use crate::model::EntityId;
use crate::repo::{audit_from_row, require_rows, validate_actor, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ORG_SELECT_SQL: &str =
    "SELECT id, environment_id, name, created_at, updated_at, modified_by FROM uhub_orgs";
const USER_SELECT_SQL: &str = "SELECT id, environment_id, username, uhub_org_id, \
     created_at, updated_at, modified_by FROM uhub_users";

/// Organization with its users eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UhubOrgDetail {
    pub org: UhubOrg,
    pub users: Vec<UhubUser>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUhubUser {
    pub username: String,
    pub uhub_org_id: EntityId,
}

pub struct UhubOrgRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> UhubOrgRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<UhubOrg>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ORG_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_org_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<UhubOrg>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ORG_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut orgs = Vec::new();
        while let Some(row) = rows.next()? {
            orgs.push(parse_org_row(row)?);
        }
        Ok(orgs)
    }

    pub fn get_by_name(&self, environment_id: EntityId, name: &str) -> RepoResult<Option<UhubOrg>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ORG_SELECT_SQL} WHERE environment_id = ?1 AND name = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, name], parse_org_row)
            .optional()?)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<UhubOrgDetail>> {
        let Some(org) = self.get_by_id(id)? else {
            return Ok(None);
        };
        let users = UhubUserRepository::new(self.conn).get_by_org(id)?;
        Ok(Some(UhubOrgDetail { org, users }))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<UhubOrgDetail>> {
        let users_repo = UhubUserRepository::new(self.conn);
        self.get_all()?
            .into_iter()
            .map(|org| {
                let users = users_repo.get_by_org(org.id)?;
                Ok(UhubOrgDetail { org, users })
            })
            .collect()
    }

    pub fn create(
        &self,
        name: &str,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<UhubOrg> {
        validate_actor(modified_by)?;
        if name.trim().is_empty() {
            return Err(RepoError::Validation(
                "organization name must not be empty".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT INTO uhub_orgs (environment_id, name, modified_by) VALUES (?1, ?2, ?3);",
            params![environment_id, name, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("uhub organization", id))
    }

    pub fn update(&self, id: EntityId, name: &str, modified_by: &str) -> RepoResult<UhubOrg> {
        validate_actor(modified_by)?;
        let changed = self.conn.execute(
            "UPDATE uhub_orgs
             SET name = ?1,
                 modified_by = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?3;",
            params![name, modified_by, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("uhub organization", id));
        }
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("uhub organization", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM uhub_orgs WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

pub struct UhubUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> UhubUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<UhubUser>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_user_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<UhubUser>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY username ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    pub fn get_by_name(
        &self,
        environment_id: EntityId,
        username: &str,
    ) -> RepoResult<Option<UhubUser>> {
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL} WHERE environment_id = ?1 AND username = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, username], parse_user_row)
            .optional()?)
    }

    pub fn get_by_org(&self, uhub_org_id: EntityId) -> RepoResult<Vec<UhubUser>> {
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL} WHERE uhub_org_id = ?1 ORDER BY username ASC;"
        ))?;
        let mut rows = stmt.query([uhub_org_id])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    pub fn create(
        &self,
        input: &NewUhubUser,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<UhubUser> {
        validate_actor(modified_by)?;
        if input.username.trim().is_empty() {
            return Err(RepoError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        require_rows(
            self.conn,
            "uhub organization",
            "uhub_orgs",
            &[input.uhub_org_id],
        )?;

        self.conn.execute(
            "INSERT INTO uhub_users (environment_id, username, uhub_org_id, modified_by)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                environment_id,
                input.username,
                input.uhub_org_id,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("uhub user", id))
    }

    pub fn update(&self, id: EntityId, username: &str, modified_by: &str) -> RepoResult<UhubUser> {
        validate_actor(modified_by)?;
        let changed = self.conn.execute(
            "UPDATE uhub_users
             SET username = ?1,
                 modified_by = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?3;",
            params![username, modified_by, id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("uhub user", id));
        }
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("uhub user", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM uhub_users WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

fn parse_org_row(row: &Row<'_>) -> rusqlite::Result<UhubOrg> {
    Ok(UhubOrg {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        name: row.get("name")?,
        audit: audit_from_row(row)?,
    })
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<UhubUser> {
    Ok(UhubUser {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        username: row.get("username")?,
        uhub_org_id: row.get("uhub_org_id")?,
        audit: audit_from_row(row)?,
    })
}
