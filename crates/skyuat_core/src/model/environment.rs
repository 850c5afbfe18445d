//! Environment entity: the isolation boundary for all scoped data.

use crate::model::{Audit, EntityId};
use serde::{Deserialize, Serialize};

/// Tenancy/isolation boundary. Environment names are globally unique;
/// every environment-scoped uniqueness constraint is qualified by this id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}
