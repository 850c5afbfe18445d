//! Global lookup tables: systems under test, document sections, zone reasons.
//!
//! These are reference data without environment scoping or audit fields;
//! their names are globally unique.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};

/// System under test (e.g. "USSP", "CISP").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
}

/// Specification/document section a requirement belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
}

/// Restriction reason attached to UAS zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
}
