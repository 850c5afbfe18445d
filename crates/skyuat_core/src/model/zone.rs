//! UAS geographical zones.
//!
//! # Invariants
//! - `radius_m` is required iff `area_type == Circle`.
//! - `width_m` is required iff `area_type == Corridor`.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Geometry family of a UAS zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaType {
    /// Point + radius geometry; `radius_m` is mandatory.
    Circle,
    /// Arbitrary polygon; no extra scalar fields.
    Polygon,
    /// Path + width geometry; `width_m` is mandatory.
    Corridor,
}

/// UAS zone restricting or enabling operations in an airspace volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UasZone {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub name: String,
    pub area_type: AreaType,
    pub radius_m: Option<f64>,
    pub width_m: Option<f64>,
    /// Lower vertical limit in meters AMSL.
    pub lower_limit_m: Option<i64>,
    /// Upper vertical limit in meters AMSL.
    pub upper_limit_m: Option<i64>,
    #[serde(flatten)]
    pub audit: Audit,
}
