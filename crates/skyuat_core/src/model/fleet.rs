//! Fleet ownership chain: Email → Operator → Drone.
//!
//! # Invariants
//! - An operator references exactly one email; a drone exactly one operator.
//! - Parents are delete-restricted while dependents exist.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Contact email address, unique per environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub address: String,
    #[serde(flatten)]
    pub audit: Audit,
}

/// UAS operator registered with a contact email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub name: String,
    pub email_id: EntityId,
    /// EASA operator registration id, when known.
    pub easa_id: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

/// Drone owned by exactly one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drone {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub name: String,
    pub serial_number: Option<String>,
    pub operator_id: EntityId,
    #[serde(flatten)]
    pub audit: Audit,
}
