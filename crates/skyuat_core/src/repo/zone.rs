//! UAS zone repository.
//!
//! # Responsibility
//! - CRUD for zones plus wholesale replacement of the organization and
//!   reason association sets.
//! - Conditional geometry validation (`radius_m` for circles, `width_m`
//!   for corridors).
//!
//! # Invariants
//! - Zone names are unique per environment.
//! - Association updates replace the full set; an omitted patch field
//!   preserves the current set, an empty list clears it.

use crate::model::lookup::Reason;
use crate::model::uhub::UhubOrg;
use crate::model::zone::{AreaType, UasZone};
use crate::model::EntityId;
use crate::repo::uhub::UhubOrgRepository;
use crate::repo::{
    audit_from_row, linked_ids, replace_links, validate_actor, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ZONE_SELECT_SQL: &str = "SELECT id, environment_id, name, area_type, radius_m, width_m, \
     lower_limit_m, upper_limit_m, created_at, updated_at, modified_by FROM uas_zones";

/// Zone with its association sets eager-loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UasZoneDetail {
    pub zone: UasZone,
    pub organizations: Vec<UhubOrg>,
    pub reasons: Vec<Reason>,
}

/// Create payload for a zone.
#[derive(Debug, Clone)]
pub struct NewUasZone {
    pub name: String,
    pub area_type: AreaType,
    pub radius_m: Option<f64>,
    pub width_m: Option<f64>,
    pub lower_limit_m: Option<i64>,
    pub upper_limit_m: Option<i64>,
    pub organizations: Vec<EntityId>,
    pub reasons: Vec<EntityId>,
}

/// Partial update; association fields present in the patch replace the
/// full set.
#[derive(Debug, Clone, Default)]
pub struct UasZonePatch {
    pub name: Option<String>,
    pub area_type: Option<AreaType>,
    pub radius_m: Option<Option<f64>>,
    pub width_m: Option<Option<f64>>,
    pub lower_limit_m: Option<Option<i64>>,
    pub upper_limit_m: Option<Option<i64>>,
    pub organizations: Option<Vec<EntityId>>,
    pub reasons: Option<Vec<EntityId>>,
}

pub struct UasZoneRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> UasZoneRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_id(&self, id: EntityId) -> RepoResult<Option<UasZone>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ZONE_SELECT_SQL} WHERE id = ?1;"))?;
        let found = stmt.query_row([id], |row| Ok(parse_zone_row(row))).optional()?;
        found.transpose()
    }

    pub fn get_all(&self) -> RepoResult<Vec<UasZone>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ZONE_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut zones = Vec::new();
        while let Some(row) = rows.next()? {
            zones.push(parse_zone_row(row)?);
        }
        Ok(zones)
    }

    pub fn get_by_name(&self, environment_id: EntityId, name: &str) -> RepoResult<Option<UasZone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ZONE_SELECT_SQL} WHERE environment_id = ?1 AND name = ?2;"
        ))?;
        let found = stmt
            .query_row(params![environment_id, name], |row| Ok(parse_zone_row(row)))
            .optional()?;
        found.transpose()
    }

    pub fn get_with_relations(&self, id: EntityId) -> RepoResult<Option<UasZoneDetail>> {
        let Some(zone) = self.get_by_id(id)? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(zone)?))
    }

    pub fn get_all_with_relations(&self) -> RepoResult<Vec<UasZoneDetail>> {
        self.get_all()?
            .into_iter()
            .map(|zone| self.hydrate(zone))
            .collect()
    }

    pub fn create(
        &self,
        input: &NewUasZone,
        environment_id: EntityId,
        modified_by: &str,
    ) -> RepoResult<UasZoneDetail> {
        validate_actor(modified_by)?;
        validate_geometry(input.area_type, input.radius_m, input.width_m)?;

        self.conn.execute(
            "INSERT INTO uas_zones (environment_id, name, area_type, radius_m, width_m,
                 lower_limit_m, upper_limit_m, modified_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                environment_id,
                input.name,
                area_type_to_db(input.area_type),
                input.radius_m,
                input.width_m,
                input.lower_limit_m,
                input.upper_limit_m,
                modified_by
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.replace_organizations(id, &input.organizations)?;
        self.replace_reasons(id, &input.reasons)?;

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("uas zone", id))
    }

    pub fn update(
        &self,
        id: EntityId,
        patch: &UasZonePatch,
        modified_by: &str,
    ) -> RepoResult<UasZoneDetail> {
        validate_actor(modified_by)?;
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| RepoError::not_found("uas zone", id))?;

        let name = patch.name.clone().unwrap_or(current.name);
        let area_type = patch.area_type.unwrap_or(current.area_type);
        let radius_m = patch.radius_m.unwrap_or(current.radius_m);
        let width_m = patch.width_m.unwrap_or(current.width_m);
        let lower_limit_m = patch.lower_limit_m.unwrap_or(current.lower_limit_m);
        let upper_limit_m = patch.upper_limit_m.unwrap_or(current.upper_limit_m);
        validate_geometry(area_type, radius_m, width_m)?;

        self.conn.execute(
            "UPDATE uas_zones
             SET name = ?1,
                 area_type = ?2,
                 radius_m = ?3,
                 width_m = ?4,
                 lower_limit_m = ?5,
                 upper_limit_m = ?6,
                 modified_by = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?8;",
            params![
                name,
                area_type_to_db(area_type),
                radius_m,
                width_m,
                lower_limit_m,
                upper_limit_m,
                modified_by,
                id
            ],
        )?;

        if let Some(organizations) = &patch.organizations {
            self.replace_organizations(id, organizations)?;
        }
        if let Some(reasons) = &patch.reasons {
            self.replace_reasons(id, reasons)?;
        }

        self.get_with_relations(id)?
            .ok_or_else(|| RepoError::not_found("uas zone", id))
    }

    pub fn delete(&self, id: EntityId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM uas_zones WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn replace_organizations(&self, id: EntityId, organizations: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "zone_orgs",
            "uas_zone_id",
            id,
            "uhub_org_id",
            "uhub organization",
            "uhub_orgs",
            organizations,
        )
    }

    fn replace_reasons(&self, id: EntityId, reasons: &[EntityId]) -> RepoResult<()> {
        replace_links(
            self.conn,
            "zone_reasons",
            "uas_zone_id",
            id,
            "reason_id",
            "reason",
            "reasons",
            reasons,
        )
    }

    fn hydrate(&self, zone: UasZone) -> RepoResult<UasZoneDetail> {
        let org_repo = UhubOrgRepository::new(self.conn);
        let organizations = linked_ids(self.conn, "zone_orgs", "uas_zone_id", "uhub_org_id", zone.id)?
            .into_iter()
            .map(|org_id| {
                org_repo
                    .get_by_id(org_id)?
                    .ok_or_else(|| RepoError::not_found("uhub organization", org_id))
            })
            .collect::<RepoResult<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.name, r.description
             FROM zone_reasons zr
             INNER JOIN reasons r ON r.id = zr.reason_id
             WHERE zr.uas_zone_id = ?1
             ORDER BY r.name ASC;",
        )?;
        let mut rows = stmt.query([zone.id])?;
        let mut reasons = Vec::new();
        while let Some(row) = rows.next()? {
            reasons.push(Reason {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            });
        }

        Ok(UasZoneDetail {
            zone,
            organizations,
            reasons,
        })
    }
}

fn validate_geometry(
    area_type: AreaType,
    radius_m: Option<f64>,
    width_m: Option<f64>,
) -> RepoResult<()> {
    match area_type {
        AreaType::Circle if radius_m.is_none() => Err(RepoError::Validation(
            "radius_m is required for circle zones".to_string(),
        )),
        AreaType::Corridor if width_m.is_none() => Err(RepoError::Validation(
            "width_m is required for corridor zones".to_string(),
        )),
        _ => Ok(()),
    }
}

fn area_type_to_db(area_type: AreaType) -> &'static str {
    match area_type {
        AreaType::Circle => "circle",
        AreaType::Polygon => "polygon",
        AreaType::Corridor => "corridor",
    }
}

fn parse_area_type(value: &str) -> Option<AreaType> {
    match value {
        "circle" => Some(AreaType::Circle),
        "polygon" => Some(AreaType::Polygon),
        "corridor" => Some(AreaType::Corridor),
        _ => None,
    }
}

fn parse_zone_row(row: &Row<'_>) -> RepoResult<UasZone> {
    let area_type_text: String = row.get("area_type")?;
    let area_type = parse_area_type(&area_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid area type `{area_type_text}` in uas_zones.area_type"
        ))
    })?;

    Ok(UasZone {
        id: row.get("id")?,
        environment_id: row.get("environment_id")?,
        name: row.get("name")?,
        area_type,
        radius_m: row.get("radius_m")?,
        width_m: row.get("width_m")?,
        lower_limit_m: row.get("lower_limit_m")?,
        upper_limit_m: row.get("upper_limit_m")?,
        audit: audit_from_row(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{validate_geometry, AreaType};

    #[test]
    fn circle_requires_radius() {
        let err = validate_geometry(AreaType::Circle, None, None).unwrap_err();
        assert!(err.to_string().contains("radius_m"));
        assert!(validate_geometry(AreaType::Circle, Some(500.0), None).is_ok());
    }

    #[test]
    fn corridor_requires_width() {
        let err = validate_geometry(AreaType::Corridor, None, None).unwrap_err();
        assert!(err.to_string().contains("width_m"));
        assert!(validate_geometry(AreaType::Corridor, None, Some(60.0)).is_ok());
    }

    #[test]
    fn polygon_needs_no_scalar_geometry() {
        assert!(validate_geometry(AreaType::Polygon, None, None).is_ok());
    }
}
