//! U-hub organizations and their users.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Organization registered in the U-hub platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UhubOrg {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub audit: Audit,
}

/// User account belonging to one U-hub organization.
///
/// The organization is delete-restricted while users exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UhubUser {
    pub id: EntityId,
    pub environment_id: EntityId,
    pub username: String,
    pub uhub_org_id: EntityId,
    #[serde(flatten)]
    pub audit: Audit,
}
