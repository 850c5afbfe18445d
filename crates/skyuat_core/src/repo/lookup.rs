//! Repositories for the global lookup tables (systems, sections, reasons).
//!
//! # Responsibility
//! - CRUD and create-or-get over the three unscoped reference tables.
//!
//! # Invariants
//! - Lookup names are globally unique (no environment qualification).
//! - Rows are delete-restricted while any association references them.

use crate::model::lookup::{Reason, Section, System};
use crate::model::EntityId;
use crate::repo::{insert_or_fetch, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Create/update payload shared by all lookup tables.
#[derive(Debug, Clone, Default)]
pub struct LookupInput {
    pub name: String,
    pub description: Option<String>,
}

/// Shared row shape of the three lookup tables.
type LookupRow = (EntityId, String, Option<String>);

fn lookup_get_by_id(conn: &Connection, table: &str, id: EntityId) -> RepoResult<Option<LookupRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, description FROM {table} WHERE id = ?1;"
    ))?;
    let found = stmt
        .query_row([id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .optional()?;
    Ok(found)
}

fn lookup_get_by_name(conn: &Connection, table: &str, name: &str) -> RepoResult<Option<LookupRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, description FROM {table} WHERE name = ?1;"
    ))?;
    let found = stmt
        .query_row([name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .optional()?;
    Ok(found)
}

fn lookup_get_all(conn: &Connection, table: &str) -> RepoResult<Vec<LookupRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, description FROM {table} ORDER BY name ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push((row.get(0)?, row.get(1)?, row.get(2)?));
    }
    Ok(entries)
}

fn lookup_create(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    input: &LookupInput,
) -> RepoResult<LookupRow> {
    if input.name.trim().is_empty() {
        return Err(RepoError::Validation(format!(
            "{entity} name must not be empty"
        )));
    }
    conn.execute(
        &format!("INSERT INTO {table} (name, description) VALUES (?1, ?2);"),
        params![input.name, input.description],
    )?;
    let id = conn.last_insert_rowid();
    lookup_get_by_id(conn, table, id)?.ok_or_else(|| RepoError::not_found(entity, id))
}

fn lookup_update(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    id: EntityId,
    input: &LookupInput,
) -> RepoResult<LookupRow> {
    let changed = conn.execute(
        &format!("UPDATE {table} SET name = ?1, description = ?2 WHERE id = ?3;"),
        params![input.name, input.description, id],
    )?;
    if changed == 0 {
        return Err(RepoError::not_found(entity, id));
    }
    lookup_get_by_id(conn, table, id)?.ok_or_else(|| RepoError::not_found(entity, id))
}

fn lookup_delete(conn: &Connection, table: &str, id: EntityId) -> RepoResult<bool> {
    let changed = conn.execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [id])?;
    Ok(changed > 0)
}

macro_rules! lookup_repository {
    ($repo:ident, $model:ident, $table:literal, $entity:literal) => {
        pub struct $repo<'conn> {
            conn: &'conn Connection,
        }

        impl<'conn> $repo<'conn> {
            pub fn new(conn: &'conn Connection) -> Self {
                Self { conn }
            }

            pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<$model>> {
                Ok(lookup_get_by_id(self.conn, $table, id)?.map(to_model))
            }

            pub fn get_by_name(&self, name: &str) -> RepoResult<Option<$model>> {
                Ok(lookup_get_by_name(self.conn, $table, name)?.map(to_model))
            }

            pub fn get_all(&self) -> RepoResult<Vec<$model>> {
                Ok(lookup_get_all(self.conn, $table)?
                    .into_iter()
                    .map(to_model)
                    .collect())
            }

            pub fn create(&self, input: &LookupInput) -> RepoResult<$model> {
                Ok(to_model(lookup_create(self.conn, $table, $entity, input)?))
            }

            pub fn update(&self, id: EntityId, input: &LookupInput) -> RepoResult<$model> {
                Ok(to_model(lookup_update(
                    self.conn, $table, $entity, id, input,
                )?))
            }

            pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
                lookup_delete(self.conn, $table, id)
            }

            /// Insert-first create-or-get by unique name.
            pub fn get_or_create(&self, name: &str) -> RepoResult<($model, bool)> {
                insert_or_fetch(
                    $entity,
                    || {
                        self.create(&LookupInput {
                            name: name.to_string(),
                            description: None,
                        })
                    },
                    || self.get_by_name(name),
                )
            }
        }

        fn to_model((id, name, description): LookupRow) -> $model {
            $model {
                id,
                name,
                description,
            }
        }
    };
}

mod systems {
    use super::*;
    lookup_repository!(SystemRepository, System, "systems", "system");
}

mod sections {
    use super::*;
    lookup_repository!(SectionRepository, Section, "sections", "section");
}

mod reasons {
    use super::*;
    lookup_repository!(ReasonRepository, Reason, "reasons", "reason");
}

pub use reasons::ReasonRepository;
pub use sections::SectionRepository;
pub use systems::SystemRepository;
