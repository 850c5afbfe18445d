//! Repository layer: per-entity-family CRUD and association management.
//!
//! # Responsibility
//! - Own all SQL touching the entity tables; nothing above this layer sees
//!   statements or rows.
//! - Enforce create/update validation (required associations, conditional
//!   fields, non-empty actor).
//! - Classify store errors into the repository error taxonomy without
//!   discarding the native error.
//!
//! # Invariants
//! - Read misses return `None`; `delete` on a missing id returns `false`.
//! - `update` on a missing id is a `NotFound` error.
//! - Referential-integrity conflicts surface as `RepoError::Integrity`
//!   wrapping the untranslated store error.
//! - Association updates are wholesale replace-set; atomicity comes from the
//!   enclosing unit-of-work transaction.

use crate::db::DbError;
use crate::model::{Audit, EntityId};
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod block;
pub mod bug;
pub mod campaign;
pub mod environment;
pub mod file;
pub mod fleet;
pub mod lookup;
pub mod requirement;
pub mod run;
pub mod testcase;
pub mod uhub;
pub mod zone;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error taxonomy at the repository boundary.
#[derive(Debug)]
pub enum RepoError {
    /// Input rejected before touching the store; message names the field
    /// or relation at fault.
    Validation(String),
    /// Mutation target or referenced association row does not exist.
    NotFound {
        entity: &'static str,
        id: EntityId,
    },
    /// Constraint rejection from the store (uniqueness, foreign key,
    /// check). The native error is preserved for pattern matching.
    Integrity(rusqlite::Error),
    /// Non-constraint store or bootstrap failure.
    Db(DbError),
    /// Persisted state cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: EntityId) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether this is a uniqueness (or primary-key) integrity conflict.
    pub fn is_unique_conflict(&self) -> bool {
        match self {
            Self::Integrity(err) => {
                matches!(
                    extended_code(err),
                    Some(code) if code == EXT_CONSTRAINT_UNIQUE || code == EXT_CONSTRAINT_PRIMARYKEY
                )
            }
            _ => false,
        }
    }

    /// Whether this is a foreign-key (delete-restricted or dangling
    /// reference) integrity conflict.
    pub fn is_foreign_key_conflict(&self) -> bool {
        match self {
            Self::Integrity(err) => {
                matches!(extended_code(err), Some(code) if code == EXT_CONSTRAINT_FOREIGNKEY)
            }
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Integrity(err) => write!(f, "integrity conflict: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(_) => None,
            Self::NotFound { .. } => None,
            Self::Integrity(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_constraint_error(&value) {
            Self::Integrity(value)
        } else {
            Self::Db(DbError::Sqlite(value))
        }
    }
}

// SQLite extended result codes for constraint failures.
const EXT_CONSTRAINT_FOREIGNKEY: i32 = 787;
const EXT_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const EXT_CONSTRAINT_UNIQUE: i32 = 2067;

fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
        _ => None,
    }
}

fn is_constraint_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Rejects empty or whitespace-only actor strings.
pub(crate) fn validate_actor(modified_by: &str) -> RepoResult<()> {
    if modified_by.trim().is_empty() {
        return Err(RepoError::Validation(
            "modified_by must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Reads the shared audit columns from a row.
pub(crate) fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<Audit> {
    Ok(Audit {
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        modified_by: row.get("modified_by")?,
    })
}

/// Verifies that every id in `ids` exists in `table`.
///
/// A dangling association id is a caller error and surfaces as a not-found
/// lookup failure naming the referenced entity, before any join row is
/// written.
pub(crate) fn require_rows(
    conn: &Connection,
    entity: &'static str,
    table: &str,
    ids: &[EntityId],
) -> RepoResult<()> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);");
    let mut stmt = conn.prepare(&sql)?;
    for id in ids {
        let exists: i64 = stmt.query_row([id], |row| row.get(0))?;
        if exists == 0 {
            return Err(RepoError::not_found(entity, *id));
        }
    }
    Ok(())
}

/// Replaces the full association set in `join_table` for one owner row.
///
/// Target ids are resolved first so a dangling id fails as a lookup error
/// rather than a foreign-key rejection on insert.
pub(crate) fn replace_links(
    conn: &Connection,
    join_table: &str,
    owner_col: &str,
    owner_id: EntityId,
    target_col: &str,
    target_entity: &'static str,
    target_table: &str,
    target_ids: &[EntityId],
) -> RepoResult<()> {
    require_rows(conn, target_entity, target_table, target_ids)?;

    conn.execute(
        &format!("DELETE FROM {join_table} WHERE {owner_col} = ?1;"),
        [owner_id],
    )?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {join_table} ({owner_col}, {target_col}) VALUES (?1, ?2);"
    ))?;
    for target_id in target_ids {
        stmt.execute([owner_id, *target_id])?;
    }
    Ok(())
}

/// Loads the association id list for one owner row, ordered by target id.
pub(crate) fn linked_ids(
    conn: &Connection,
    join_table: &str,
    owner_col: &str,
    target_col: &str,
    owner_id: EntityId,
) -> RepoResult<Vec<EntityId>> {
    let sql = format!(
        "SELECT {target_col} FROM {join_table} WHERE {owner_col} = ?1 ORDER BY {target_col} ASC;"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([owner_id])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

/// Canonical insert-first create-or-get helper.
///
/// Attempts the insert; when the store reports a uniqueness conflict (a
/// concurrent or earlier writer won), falls back to re-reading the existing
/// row and returns it with `created = false`. Any other error propagates.
pub(crate) fn insert_or_fetch<T>(
    entity: &'static str,
    insert: impl FnOnce() -> RepoResult<T>,
    fetch: impl FnOnce() -> RepoResult<Option<T>>,
) -> RepoResult<(T, bool)> {
    match insert() {
        Ok(created) => Ok((created, true)),
        Err(err) if err.is_unique_conflict() => match fetch()? {
            Some(existing) => Ok((existing, false)),
            None => Err(RepoError::InvalidData(format!(
                "{entity} insert reported a uniqueness conflict but no row was found"
            ))),
        },
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_actor, RepoError};

    #[test]
    fn validate_actor_rejects_blank() {
        assert!(validate_actor("tester").is_ok());
        assert!(matches!(
            validate_actor("   "),
            Err(RepoError::Validation(_))
        ));
    }
}
