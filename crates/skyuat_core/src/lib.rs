//! Persistence and service core for the SkyUAT acceptance-testing
//! desktop application.
//! This crate is the single source of truth for business invariants.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;
pub mod uow;

pub use context::{
    global, AppContext, ContextConfig, ContextError, Service, BUG_SERVICE, CAMPAIGN_SERVICE,
    CASE_SERVICE, REQUIREMENT_SERVICE,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::EntityId;
pub use repo::{RepoError, RepoResult};
pub use service::bug_service::{BugDraft, BugService, BugServiceError};
pub use service::campaign_service::{CampaignDraft, CampaignService, CampaignServiceError};
pub use service::case_service::{CaseDraft, CaseService, CaseServiceError, StepDraft};
pub use service::requirement_service::{
    RequirementDraft, RequirementService, RequirementServiceError,
};
pub use service::FileDraft;
pub use session::{DatabaseLocation, Session, SessionFactory};
pub use uow::UnitOfWork;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
