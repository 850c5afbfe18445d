//! Block repository: case groupings used to assemble campaigns.
//!
//! # Invariants
//! - Block names are unique per environment.
//! - The owning system is delete-restricted while blocks reference it.
//! - The case association replaces wholesale; cases themselves are
//!   delete-restricted while a block references them.

use crate::model::lookup::System;
use crate::model::testplan::{Block, Case};
use crate::model::EntityId;
use crate::repo::lookup::SystemRepository;
use crate::repo::testcase::CaseRepository;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, require_rows, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const BLOCK_SELECT_SQL: &str = "SELECT id, environment_id, name, system_id, \
     created_at, updated_at, modified_by FROM blocks";

/// Block with its system and case set eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDetail {
    pub block: Block,
    pub system: System,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Default)]
pub struct NewBlock {
    pub name: String,
    pub system_id: EntityId,
    pub cases: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockPatch {
    pub name: Option<String>,
    pub system_id: Option<EntityId>,
    pub cases: Option<Vec<EntityId>>,
}

pub struct BlockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> BlockRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Block>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BLOCK_SELECT_SQL} WHERE id = ?1;"))?;
        Ok(stmt.query_row([id], parse_block_row).optional()?)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Block>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BLOCK_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            blocks.push(parse_block_row(row)?);
        }
        Ok(blocks)
    }

    pub fn get_by_name(&self, environment_id: EntityId, name: &str) -> RepoResult<Option<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL} WHERE environment_id = ?1 AND name = ?2;"
        ))?;
        Ok(stmt
            .query_row(params![environment_id, name], parse_block_row)
            .optional()?)
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<BlockDetail>> {
        let Some(block) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(block)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<BlockDetail>> {
        self.get_all()?
            .into_iter()
            .map(|block| self.hydrate(block))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewBlock,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<BlockDetail> {
        validate_actor(modified_by)?;
        if input.name.trim().is_empty() {
            return Err(RepoError::Validation(
                "block name must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "system", "systems", &[input.system_id])?;

        self.conn.execute(
            "INSERT INTO blocks (environment_id, name, system_id, modified_by)
             VALUES (?1, ?2, ?3, ?4);",
            params![environment_id, input.name, input.system_id, modified_by],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_cases(id, &input.cases)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("block", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &BlockPatch,
        modified_by: &str,
    ) -> RepoResult<BlockDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("block", id))?;

        let name = patch.name.clone().unwrap_or(current.name);
        let system_id = patch.system_id.unwrap_or(current.system_id);
        if patch.system_id.is_some() {
            require_rows(self.conn, "system", "systems", &[system_id])?;
        }

        self.conn.execute(
            "UPDATE blocks
             SET name = ?1,
                 system_id = ?2,
                 modified_by = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?4;",
            params![name, system_id, modified_by, id],
        )?;

        if let Some(cases) = &patch.cases {
            self.replace_cases(id, cases)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("block", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute("DELETE FROM blocks WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    /// Ids of the cases attached to one block.
    pub fn case_ids(&self, id: EntityId) -> RepoResult<Vec<EntityId>> {
        linked_ids(self.conn, "block_cases", "block_id", "case_id", id)
    }

    fn replace_cases(&self, id: EntityId, cases: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "block_cases",
            "block_id",
            id,
            "case_id",
            "case",
            "cases",
            cases,
        )
    }

    fn hydrate(&self, block: Block) -> RepoResult<BlockDetail> {
        let system = SystemRepository::new(self.conn)
            .get_by_id(block.system_id)?
            .ok_or_else(|| RepoError::not_found("system", block.system_id))?;
        let case_repo = CaseRepository::new(self.conn);
        let cases = self
            .case_ids(block.id)?
            .into_iter()
            .map(|case_id| {
                case_repo
                    .get_by_id(case_id)?
                    .ok_or_else(|| RepoError::not_found("case", case_id))
            })
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(BlockDetail {
            block,
            system,
            cases,
        })
    }
}

fn parse_block_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        name: row.get("name")?,
        system_id: row.get("system_id")?,
        audit: audit_from_row(row)?,
    })
}
