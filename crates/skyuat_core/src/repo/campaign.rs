//! Campaign repository.
//!
//! # Responsibility
//! - CRUD for campaigns, their block association set, and the status
//!   column codec.
//!
//! # Invariants
//! - `code` is unique per environment.
//! - Status transitions are validated by the service layer; this
//!   repository persists whatever status it is told, so snapshots and
//!   imports can restore any state.

use crate::model::campaign::{Campaign, CampaignStatus};
use crate::model::lookup::System;
use crate::model::testplan::Block;
use crate::model::EntityId;
use crate::repo::block::BlockRepository;
use crate::repo::lookup::SystemRepository;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, require_rows, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CAMPAIGN_SELECT_SQL: &str = "SELECT id, environment_id, code, name, system_id, status, \
     created_at, updated_at, modified_by FROM campaigns";

/// Campaign with its system and block set eager-loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub system: System,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCampaign {
    pub code: String,
    pub name: String,
    pub system_id: EntityId,
    pub blocks: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub system_id: Option<EntityId>,
    pub status: Option<CampaignStatus>,
    pub blocks: Option<Vec<EntityId>>,
}

pub struct CampaignRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CampaignRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<Campaign>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAMPAIGN_SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt
            .query_row([id], |row| Ok(parse_campaign_row(row)))
            .optional()?;
        found.transpose()
    }

    pub fn get_all(&self) -> RepoResult<Vec<Campaign>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAMPAIGN_SELECT_SQL} ORDER BY code ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut campaigns = Vec::new();
        while let Some(row) = rows.next()? {
            campaigns.push(parse_campaign_row(row)?);
        }
        Ok(campaigns)
    }

    pub fn get_by_code(
        &self,
        environment_id: EntityId,
        code: &str,
    ) -> RepoResult<Option<Campaign>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CAMPAIGN_SELECT_SQL} WHERE environment_id = ?1 AND code = ?2;"
        ))?;
        let found = stmt
            .query_row(params![environment_id, code], |row| {
                Ok(parse_campaign_row(row))
            })
            .optional()?;
        found.transpose()
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<CampaignDetail>> {
        let Some(campaign) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(campaign)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<CampaignDetail>> {
        self.get_all()?
            .into_iter()
            .map(|campaign| self.hydrate(campaign))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewCampaign,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<CampaignDetail> {
        validate_actor(modified_by)?;
        if input.code.trim().is_empty() {
            return Err(RepoError::Validation(
                "campaign code must not be empty".to_string(),
            ));
        }
        if input.name.trim().is_empty() {
            return Err(RepoError::Validation(
                "campaign name must not be empty".to_string(),
            ));
        }
        require_rows(self.conn, "system", "systems", &[input.system_id])?;

        self.conn.execute(
            "INSERT INTO campaigns (environment_id, code, name, system_id, status, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                environment_id,
                input.code,
                input.name,
                input.system_id,
                status_to_db(CampaignStatus::Draft),
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_blocks(id, &input.blocks)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("campaign", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &CampaignPatch,
        modified_by: &str,
    ) -> RepoResult<CampaignDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("campaign", id))?;

        let code = patch.code.clone().unwrap_or(current.code);
        let name = patch.name.clone().unwrap_or(current.name);
        let system_id = patch.system_id.unwrap_or(current.system_id);
        let status = patch.status.unwrap_or(current.status);
        if patch.system_id.is_some() {
            require_rows(self.conn, "system", "systems", &[system_id])?;
        }

        self.conn.execute(
            "UPDATE campaigns
             SET code = ?1,
                 name = ?2,
                 system_id = ?3,
                 status = ?4,
                 modified_by = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?6;",
            params![code, name, system_id, status_to_db(status), modified_by, id],
        )?;

        if let Some(blocks) = &patch.blocks {
            self.replace_blocks(id, blocks)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("campaign", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM campaigns WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    /// Ids of the blocks attached to one campaign.
    pub fn block_ids(&self, id: EntityId) -> RepoResult<Vec<EntityId>> {
        linked_ids(self.conn, "campaign_blocks", "campaign_id", "block_id", id)
    }

    fn replace_blocks(&self, id: EntityId, blocks: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "campaign_blocks",
            "campaign_id",
            id,
            "block_id",
            "block",
            "blocks",
            blocks,
        )
    }

    fn hydrate(&self, campaign: Campaign) -> RepoResult<CampaignDetail> {
        let system = SystemRepository::new(self.conn)
            .get_by_id(campaign.system_id)?
            .ok_or_else(|| RepoError::not_found("system", campaign.system_id))?;
        let block_repo = BlockRepository::new(self.conn);
        let blocks = self
            .block_ids(campaign.id)?
            .into_iter()
            .map(|block_id| {
                block_repo
                    .get_by_id(block_id)?
                    .ok_or_else(|| RepoError::not_found("block", block_id))
            })
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(CampaignDetail {
            campaign,
            system,
            blocks,
        })
    }
}

pub(crate) fn status_to_db(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Running => "running",
        CampaignStatus::Finished => "finished",
        CampaignStatus::Cancelled => "cancelled",
    }
}

pub(crate) fn parse_status(value: &str) -> Option<CampaignStatus> {
    match value {
        "draft" => Some(CampaignStatus::Draft),
        "running" => Some(CampaignStatus::Running),
        "finished" => Some(CampaignStatus::Finished),
        "cancelled" => Some(CampaignStatus::Cancelled),
        _ => None,
    }
}

fn parse_campaign_row(row: &Row<'_>) -> RepoResult<Campaign> {
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid campaign status `{status_text}` in campaigns.status"
        ))
    })?;

    Ok(Campaign {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        system_id: row.get("system_id")?,
        status,
        audit: audit_from_row(row)?,
    })
}
