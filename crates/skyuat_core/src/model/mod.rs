//! Entity model for the SkyUAT persistence core.
//!
//! # Responsibility
//! - Define the plain data records persisted by the repository layer.
//! - Keep identity, audit and environment scoping conventions in one place.
//!
//! # Invariants
//! - Identity is the SQLite rowid (`i64`), generated on insert.
//! - Every audited entity belongs to exactly one environment, except the
//!   global lookup tables (`System`, `Section`, `Reason`).
//! - `modified_by` is never empty on a persisted row.

use serde::{Deserialize, Serialize};

pub mod bug;
pub mod campaign;
pub mod environment;
pub mod file;
pub mod fleet;
pub mod lookup;
pub mod testplan;
pub mod uhub;
pub mod zone;

/// Stable row identity for every persisted entity.
pub type EntityId = i64;

/// Audit fields shared by all audited entities.
///
/// Timestamps are Unix epoch milliseconds, assigned by the store on insert
/// and refreshed by the repository on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: i64,
    pub updated_at: i64,
    /// Actor string recorded with the last mutation.
    pub modified_by: String,
}
