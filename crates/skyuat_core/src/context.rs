//! Application context: process-wide lifecycle owner.
//!
//! # Responsibility
//! - Bootstrap the database and session factory exactly once.
//! - Construct, register and locate per-aggregate services.
//! - Tear everything down in `shutdown` without ever propagating.
//!
//! # Invariants
//! - State machine: Uninitialized → Initialized → (shutdown) →
//!   Uninitialized.
//! - A failed `initialize` leaves no partial state behind.
//! - `shutdown` always clears the service registry, even when individual
//!   service shutdowns fail.
//! - Dependency injection is the primary construction path; the lazy
//!   global accessor is a thin convenience wrapper.

use crate::db::DbError;
use crate::repo::{RepoError, RepoResult};
use crate::service::bug_service::BugService;
use crate::service::campaign_service::CampaignService;
use crate::service::case_service::CaseService;
use crate::service::requirement_service::RequirementService;
use crate::session::{DatabaseLocation, SessionFactory};
use crate::uow::UnitOfWork;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Mutex;

pub const REQUIREMENT_SERVICE: &str = "requirement_service";
pub const CASE_SERVICE: &str = "case_service";
pub const CAMPAIGN_SERVICE: &str = "campaign_service";
pub const BUG_SERVICE: &str = "bug_service";

const DEFAULT_DB_FILE: &str = "skyuat.sqlite3";

/// Registered service contract.
///
/// `shutdown` failures are reported as plain strings so the context can
/// aggregate them without caring about concrete error types.
pub trait Service: Any + Send {
    fn name(&self) -> &'static str;

    fn shutdown(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Context configuration consumed once by `initialize`.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub database: DatabaseLocation,
    /// Drop all tables before migrating. Test-mode only.
    pub drop_existing: bool,
    /// Seed reference data after migrating.
    pub load_initial_data: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::File(PathBuf::from(DEFAULT_DB_FILE)),
            drop_existing: false,
            load_initial_data: true,
        }
    }
}

impl ContextConfig {
    /// In-memory configuration with a clean schema per run.
    pub fn test_mode() -> Self {
        Self {
            database: DatabaseLocation::InMemory,
            drop_existing: true,
            load_initial_data: true,
        }
    }
}

pub type ContextResult<T> = Result<T, ContextError>;

#[derive(Debug)]
pub enum ContextError {
    /// Operation requires `initialize()` first.
    NotInitialized,
    /// No service registered under the requested name.
    UnknownService(String),
    /// Registered service has a different concrete type than requested.
    ServiceType(String),
    /// Database bootstrap failure.
    Db(DbError),
    /// Repository-level failure surfaced through a context helper.
    Repo(RepoError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "application context is not initialized"),
            Self::UnknownService(name) => write!(f, "unknown service: `{name}`"),
            Self::ServiceType(name) => {
                write!(f, "service `{name}` has an unexpected concrete type")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

pub struct AppContext {
    config: ContextConfig,
    sessions: Option<SessionFactory>,
    services: HashMap<String, Box<dyn Service>>,
    initialized: bool,
}

impl AppContext {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            sessions: None,
            services: HashMap::new(),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Bootstraps the database, session factory and built-in services.
    ///
    /// Calling it on an initialized context is a warning-level no-op.
    /// Any failure propagates and leaves the context uninitialized.
    pub fn initialize(&mut self) -> ContextResult<()> {
        if self.initialized {
            warn!("event=context_init module=context status=skipped reason=already_initialized");
            return Ok(());
        }

        let sessions = SessionFactory::initialize(
            self.config.database.clone(),
            self.config.drop_existing,
            self.config.load_initial_data,
        )?;

        // Build the full registry before touching any state so a failure
        // leaves the context untouched.
        let mut services: HashMap<String, Box<dyn Service>> = HashMap::new();
        services.insert(
            REQUIREMENT_SERVICE.to_string(),
            Box::new(RequirementService::new(sessions.clone())),
        );
        services.insert(
            CASE_SERVICE.to_string(),
            Box::new(CaseService::new(sessions.clone())),
        );
        services.insert(
            CAMPAIGN_SERVICE.to_string(),
            Box::new(CampaignService::new(sessions.clone())),
        );
        services.insert(
            BUG_SERVICE.to_string(),
            Box::new(BugService::new(sessions.clone())),
        );

        self.sessions = Some(sessions);
        self.services = services;
        self.initialized = true;
        info!(
            "event=context_init module=context status=ok services={}",
            self.services.len()
        );
        Ok(())
    }

    /// Returns a registered service by name.
    pub fn get_service(&self, name: &str) -> ContextResult<&dyn Service> {
        if !self.initialized {
            return Err(ContextError::NotInitialized);
        }
        self.services
            .get(name)
            .map(|service| &**service)
            .ok_or_else(|| ContextError::UnknownService(name.to_string()))
    }

    /// Typed accessor over `get_service`.
    pub fn service<T: Service>(&self, name: &str) -> ContextResult<&T> {
        let service = self.get_service(name)?;
        service
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ContextError::ServiceType(name.to_string()))
    }

    /// Registers (or silently replaces) a service. Only valid once
    /// initialized.
    pub fn register_service(
        &mut self,
        name: &str,
        service: Box<dyn Service>,
    ) -> ContextResult<()> {
        if !self.initialized {
            return Err(ContextError::NotInitialized);
        }
        if self.services.insert(name.to_string(), service).is_some() {
            debug!("event=service_register module=context status=replaced service={name}");
        }
        Ok(())
    }

    /// Fresh unit of work bound to the context's session factory.
    pub fn unit_of_work(&self) -> ContextResult<UnitOfWork> {
        let sessions = self.session_factory()?;
        let session = sessions.session()?;
        UnitOfWork::new(session).map_err(ContextError::Repo)
    }

    /// Scoped unit-of-work acquisition; closure errors propagate after
    /// the unit of work is released.
    pub fn with_unit_of_work<T>(
        &self,
        f: impl FnOnce(&mut UnitOfWork) -> RepoResult<T>,
    ) -> ContextResult<T> {
        let sessions = self.session_factory()?;
        sessions.with_unit_of_work(f).map_err(ContextError::Repo)
    }

    pub fn session_factory(&self) -> ContextResult<&SessionFactory> {
        self.sessions.as_ref().ok_or(ContextError::NotInitialized)
    }

    /// Shuts every service down, clears the registry and returns the
    /// context to the uninitialized state. Never propagates: individual
    /// failures are logged and summarized.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            debug!("event=context_shutdown module=context status=skipped reason=not_initialized");
            return;
        }

        let mut failures: Vec<String> = Vec::new();
        for (name, service) in self.services.iter_mut() {
            if let Err(message) = service.shutdown() {
                error!(
                    "event=service_shutdown module=context status=error service={name} error={message}"
                );
                failures.push(format!("{name}: {message}"));
            }
        }
        if !failures.is_empty() {
            error!(
                "event=context_shutdown module=context status=partial failed={} summary={}",
                failures.len(),
                failures.join("; ")
            );
        }

        self.services.clear();
        self.sessions = None;
        self.initialized = false;
        info!("event=context_shutdown module=context status=ok");
    }
}

static GLOBAL_CONTEXT: Lazy<Mutex<AppContext>> =
    Lazy::new(|| Mutex::new(AppContext::new(ContextConfig::default())));

/// Process-wide context instance, lazily constructed with the default
/// configuration on first access.
pub fn global() -> &'static Mutex<AppContext> {
    &GLOBAL_CONTEXT
}
