//! Stored-file repository.
//!
//! # Responsibility
//! - Metadata persistence for attachments referenced by bugs and step runs.
//! - Generation of collision-free stored names.
//!
//! # Invariants
//! - `stored_name` is globally unique and never reused.
//! - The payload itself lives outside the database; only metadata is kept.

use crate::model::file::{FileOwner, StoredFile};
use crate::model::EntityId;
use crate::repo::{audit_from_row, validate_actor, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const FILE_SELECT_SQL: &str = "SELECT id, environment_id, owner_kind, filename, stored_name, \
     mime_type, size_bytes, created_at, updated_at, modified_by FROM files";

/// Create payload for a stored file.
#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub owner_kind: FileOwner,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}

pub struct FileRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> FileRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<StoredFile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FILE_SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt
            .query_row([id], |row| Ok(parse_file_row(row)))
            .optional()?;
        found.transpose()
    }

    pub fn get_all(&self) -> RepoResult<Vec<StoredFile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FILE_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut files = Vec::new();
        while let Some(row) = rows.next()? {
            files.push(parse_file_row(row)?);
        }
        Ok(files)
    }

    /// First file matching the original client filename in one environment.
    pub fn get_by_filename(
        &self,
        environment_id: EntityId,
        filename: &str,
    ) -> RepoResult<Option<StoredFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "{FILE_SELECT_SQL} WHERE environment_id = ?1 AND filename = ?2 ORDER BY id ASC LIMIT 1;"
        ))?;
        let found = stmt
            .query_row(params![environment_id, filename], |row| {
                Ok(parse_file_row(row))
            })
            .optional()?;
        found.transpose()
    }

    pub fn create(
        &self,
        input: &NewStoredFile,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<StoredFile> {
        validate_actor(modified_by)?;
        if input.filename.trim().is_empty() {
            return Err(RepoError::Validation(
                "filename must not be empty".to_string(),
            ));
        }
        if input.size_bytes < 0 {
            return Err(RepoError::Validation(
                "size_bytes must not be negative".to_string(),
            ));
        }

        let stored_name = generate_stored_name(&input.filename);
        self.conn.execute(
            "INSERT INTO files (environment_id, owner_kind, filename, stored_name, mime_type,
                 size_bytes, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                environment_id,
                owner_to_db(input.owner_kind),
                input.filename,
                stored_name,
                input.mime_type,
                input.size_bytes,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("file", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM files WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

/// Builds a unique stored name, keeping the original extension for
/// mime-type friendliness.
fn generate_stored_name(filename: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match filename.rsplit_once('.') {
        Some((_, extension)) if !extension.is_empty() => format!("{token}.{extension}"),
        _ => token,
    }
}

fn owner_to_db(owner: FileOwner) -> &'static str {
    match owner {
        FileOwner::Bug => "bug",
        FileOwner::StepRun => "step_run",
    }
}

fn parse_owner(value: &str) -> Option<FileOwner> {
    match value {
        "bug" => Some(FileOwner::Bug),
        "step_run" => Some(FileOwner::StepRun),
        _ => None,
    }
}

fn parse_file_row(row: &Row<'_>) -> RepoResult<StoredFile> {
    let owner_text: String = row.get("owner_kind")?;
    let owner_kind = parse_owner(&owner_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid owner kind `{owner_text}` in files.owner_kind"
        ))
    })?;

    Ok(StoredFile {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        owner_kind,
        filename: row.get("filename")?,
        stored_name: row.get("stored_name")?,
        mime_type: row.get("mime_type")?,
        size_bytes: row.get("size_bytes")?,
        audit: audit_from_row(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::generate_stored_name;

    #[test]
    fn stored_name_keeps_extension() {
        let name = generate_stored_name("evidence.png");
        assert!(name.ends_with(".png"));
        assert!(name.len() > 4);
    }

    #[test]
    fn stored_name_without_extension_is_bare_token() {
        let name = generate_stored_name("README");
        assert!(!name.contains('.'));
    }
}
