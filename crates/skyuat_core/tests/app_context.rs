use skyuat_core::{
    AppContext, ContextConfig, ContextError, DatabaseLocation, RequirementService, Service,
    BUG_SERVICE, CAMPAIGN_SERVICE, CASE_SERVICE, REQUIREMENT_SERVICE,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct FailingService {
    shutdown_called: Arc<AtomicBool>,
}

impl Service for FailingService {
    fn name(&self) -> &'static str {
        "failing_service"
    }

    fn shutdown(&mut self) -> Result<(), String> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Err("refusing to stop".to_string())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn get_service_before_initialize_is_an_error() {
    let context = AppContext::new(ContextConfig::test_mode());
    assert!(matches!(
        context.get_service(REQUIREMENT_SERVICE),
        Err(ContextError::NotInitialized)
    ));
}

#[test]
fn initialize_registers_builtin_services_and_is_idempotent() {
    let mut context = AppContext::new(ContextConfig::test_mode());
    context.initialize().unwrap();
    assert!(context.is_initialized());

    for name in [
        REQUIREMENT_SERVICE,
        CASE_SERVICE,
        CAMPAIGN_SERVICE,
        BUG_SERVICE,
    ] {
        assert!(context.get_service(name).is_ok(), "missing service {name}");
    }

    // Typed accessor resolves the concrete service type.
    let service: &RequirementService = context.service(REQUIREMENT_SERVICE).unwrap();
    let (system, created) = service.ensure_system("USSP").unwrap();
    assert!(created);
    assert_eq!(system.name, "USSP");

    // Second initialize is a warning-level no-op; existing data survives.
    context.initialize().unwrap();
    let service: &RequirementService = context.service(REQUIREMENT_SERVICE).unwrap();
    let (_, created_again) = service.ensure_system("USSP").unwrap();
    assert!(!created_again);
}

#[test]
fn unknown_service_and_wrong_type_are_distinct_errors() {
    let mut context = AppContext::new(ContextConfig::test_mode());
    context.initialize().unwrap();

    assert!(matches!(
        context.get_service("no_such_service"),
        Err(ContextError::UnknownService(_))
    ));
    assert!(matches!(
        context.service::<RequirementService>(BUG_SERVICE),
        Err(ContextError::ServiceType(_))
    ));
}

#[test]
fn register_service_requires_initialization_and_overwrites_silently() {
    let flag = Arc::new(AtomicBool::new(false));

    let mut context = AppContext::new(ContextConfig::test_mode());
    let register_before = context.register_service(
        "failing_service",
        Box::new(FailingService {
            shutdown_called: Arc::clone(&flag),
        }),
    );
    assert!(matches!(register_before, Err(ContextError::NotInitialized)));

    context.initialize().unwrap();
    context
        .register_service(
            "failing_service",
            Box::new(FailingService {
                shutdown_called: Arc::clone(&flag),
            }),
        )
        .unwrap();
    // Re-registering under the same name replaces the instance.
    context
        .register_service(
            "failing_service",
            Box::new(FailingService {
                shutdown_called: Arc::clone(&flag),
            }),
        )
        .unwrap();
    assert!(context.get_service("failing_service").is_ok());
}

#[test]
fn shutdown_clears_the_registry_even_when_a_service_fails() {
    let flag = Arc::new(AtomicBool::new(false));
    let mut context = AppContext::new(ContextConfig::test_mode());
    context.initialize().unwrap();
    context
        .register_service(
            "failing_service",
            Box::new(FailingService {
                shutdown_called: Arc::clone(&flag),
            }),
        )
        .unwrap();

    context.shutdown();

    assert!(flag.load(Ordering::SeqCst));
    assert!(!context.is_initialized());
    assert!(matches!(
        context.get_service("failing_service"),
        Err(ContextError::NotInitialized)
    ));

    // The context can be brought back up after shutdown.
    context.initialize().unwrap();
    assert!(context.get_service(REQUIREMENT_SERVICE).is_ok());
    assert!(matches!(
        context.get_service("failing_service"),
        Err(ContextError::UnknownService(_))
    ));
}

#[test]
fn context_unit_of_work_helpers_use_the_configured_database() {
    let mut context = AppContext::new(ContextConfig::test_mode());
    context.initialize().unwrap();

    let reasons = context
        .with_unit_of_work(|uow| uow.reasons().get_all())
        .unwrap();
    // test_mode seeds reference data.
    assert!(!reasons.is_empty());

    let uow = context.unit_of_work().unwrap();
    assert!(uow.environments().get_all().unwrap().is_empty());
    uow.close().unwrap();
}

#[test]
fn file_backed_context_persists_across_reinitialization() {
    let dir = tempfile::tempdir().unwrap();
    let config = ContextConfig {
        database: DatabaseLocation::File(dir.path().join("uat.sqlite3")),
        drop_existing: false,
        load_initial_data: true,
    };

    let mut context = AppContext::new(config.clone());
    context.initialize().unwrap();
    context
        .with_unit_of_work(|uow| {
            uow.environments().get_or_create("staging", "alice")?;
            uow.commit()
        })
        .unwrap();
    context.shutdown();

    let mut reopened = AppContext::new(config);
    reopened.initialize().unwrap();
    let found = reopened
        .with_unit_of_work(|uow| uow.environments().get_by_name("staging"))
        .unwrap();
    assert!(found.is_some());
    reopened.shutdown();
}
