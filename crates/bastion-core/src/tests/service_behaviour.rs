//! Service manager behaviour: declaration, lifecycle and shutdown.

use std::sync::Arc;

use rstest::rstest;
use serde_json::json;

use super::support::{CLSID_EXAMPLE_SERVICE, declare_services, flag, test_context, variant};
use crate::{
    CLSID_SERVICE_MANAGER, CommandProcessor, Context, Dictionary, ErrorKind, LifecyclePolicy,
    ServiceManager, ServiceRegistry, ServiceState, Variant,
};

fn example_context() -> Context {
    let context = test_context();
    declare_services(
        &context,
        json!({"example": {"clsid": "B5FF0001", "statePath": "state.example"}}),
    );
    context
}

fn manager(context: &Context, policy: LifecyclePolicy) -> ServiceManager {
    ServiceManager::load(context, policy).expect("service manager loads")
}

#[rstest]
fn declared_services_are_created_and_registered() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);

    assert!(flag(&context, "info.example.finalConstruct"));
    assert!(!flag(&context, "info.example.start"));
    assert_eq!(services.service_names(), vec!["example".to_owned()]);
    assert_eq!(
        services.service_state("example").expect("state known"),
        ServiceState::Constructed
    );
    let handle = services.query_service("example").expect("service found");
    assert_eq!(handle.class_id(), CLSID_EXAMPLE_SERVICE);
    assert_eq!(
        context.resolve_object("example").expect("registered by name"),
        handle
    );
}

#[rstest]
fn start_then_stop_has_both_side_effects() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);

    services.start_service("example").expect("service starts");
    assert!(flag(&context, "info.example.start"));
    assert!(!flag(&context, "info.example.stop"));

    services.stop_service("example").expect("service stops");
    assert!(flag(&context, "info.example.start"));
    assert!(flag(&context, "info.example.stop"));
    assert_eq!(
        services.service_state("example").expect("state known"),
        ServiceState::Stopped
    );
}

#[rstest]
fn unknown_services_are_invalid_arguments() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);
    let error = services
        .query_service("missing")
        .expect_err("unknown service rejected");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    let error = services
        .start_service("missing")
        .expect_err("unknown service rejected");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}

#[rstest]
fn strict_policy_rejects_out_of_order_calls() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Strict);
    let error = services
        .stop_service("example")
        .expect_err("stop before start rejected");
    assert_eq!(error.kind(), ErrorKind::InvalidUsage);
    assert!(!flag(&context, "info.example.stop"));

    services.start_service("example").expect("service starts");
    let error = services
        .start_service("example")
        .expect_err("double start rejected");
    assert_eq!(error.kind(), ErrorKind::InvalidUsage);
}

#[rstest]
fn lenient_policy_forwards_repeated_calls() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);
    services.start_service("example").expect("first start");
    services.start_service("example").expect("second start");
    let example = services
        .query_service("example")
        .and_then(|handle| handle.query_interface::<dyn CommandProcessor>())
        .expect("example processes commands");
    assert_eq!(
        example.execute("counter", &Variant::Null).expect("counter"),
        Variant::Integer(2)
    );
}

#[rstest]
fn state_is_loaded_and_saved_through_the_catalog() {
    let context = example_context();
    context
        .catalog()
        .put("state.example", variant(json!({"counter": 5})))
        .expect("state seeded");
    let services = manager(&context, LifecyclePolicy::Lenient);
    services.start_service("example").expect("service starts");
    services.shutdown_all();

    assert_eq!(
        context.catalog().get("state.example").expect("state saved"),
        variant(json!({"counter": 6}))
    );
    assert!(flag(&context, "info.example.shutdown"));
}

#[rstest]
fn shutdown_unregisters_everything_and_disables_the_manager() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);
    services
        .put_named_object("extra", Variant::from("value"))
        .expect("named object stored");

    services.shutdown_all();
    services.shutdown_all();

    assert!(context.catalog().get_safe("objects.example").expect("path").is_none());
    assert!(context.catalog().get_safe("objects.extra").expect("path").is_none());
    assert_eq!(context.objects().live_count(CLSID_EXAMPLE_SERVICE), 0);
    let error = services
        .query_service("example")
        .expect_err("manager is shut down");
    assert_eq!(error.kind(), ErrorKind::ShutdownIsStarted);
    assert!(!services.erase_named_object("extra").expect("erase is a no-op"));
}

#[rstest]
fn named_objects_live_beside_services() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);

    services
        .put_named_object("settings", variant(json!({"level": 3})))
        .expect("named object stored");
    assert_eq!(
        context.catalog().get("objects.settings.level").expect("stored"),
        Variant::Integer(3)
    );
    let error = services
        .put_named_object("example", Variant::from(1))
        .expect_err("service names are reserved");
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    assert!(services.erase_named_object("settings").expect("erased"));
    assert!(!services.erase_named_object("settings").expect("already gone"));
}

#[rstest]
fn creation_failures_roll_back_registrations() {
    let context = test_context();
    declare_services(
        &context,
        json!({
            "a_first": {"clsid": "B5FF0002"},
            "b_broken": {"clsid": "B5FF0001", "infoPath": 7},
        }),
    );
    let error = ServiceManager::load(&context, LifecyclePolicy::Lenient)
        .expect_err("broken declaration fails");
    assert_eq!(error.kind(), ErrorKind::TypeError);
    assert!(context.catalog().get_safe("objects.a_first").expect("path").is_none());
}

#[rstest]
fn non_services_cannot_be_started() {
    let context = test_context();
    declare_services(&context, json!({"echo": {"clsid": "B5FF0002"}}));
    let services = manager(&context, LifecyclePolicy::Lenient);
    let error = services
        .start_service("echo")
        .expect_err("echo has no lifecycle");
    assert_eq!(error.kind(), ErrorKind::TypeError);
}

#[rstest]
fn manager_is_a_command_processor() {
    let context = example_context();
    let handle = context
        .create_object(CLSID_SERVICE_MANAGER, &Dictionary::new())
        .expect("manager created");
    let processor = handle
        .query_interface::<dyn CommandProcessor>()
        .expect("manager processes commands");

    processor
        .execute("startService", &variant(json!({"name": "example"})))
        .expect("service started");
    assert_eq!(
        processor.execute("status", &Variant::Null).expect("status"),
        variant(json!({"example": "started"}))
    );
    let found = processor
        .execute("queryService", &variant(json!({"name": "example"})))
        .expect("service queried");
    assert_eq!(
        found.as_object().map(crate::ObjectHandle::class_id),
        Some(CLSID_EXAMPLE_SERVICE)
    );
    processor
        .execute("stop", &Variant::Null)
        .expect("services stopped");
    assert!(flag(&context, "info.example.stop"));

    let error = processor
        .execute("does_not_exist", &Variant::Null)
        .expect_err("unknown command rejected");
    assert_eq!(error.kind(), ErrorKind::OperationNotSupported);

    let registry = handle
        .query_interface::<dyn ServiceRegistry>()
        .expect("manager is a registry");
    registry.shutdown_all();
    drop(registry);
    drop(processor);
    drop(handle);
    assert_eq!(context.objects().live_count(CLSID_SERVICE_MANAGER), 0);
}

#[rstest]
fn strict_lifecycle_must_be_a_bool() {
    let context = test_context();
    let mut config = Dictionary::new();
    config.insert("strictLifecycle".into(), Variant::from("yes"));
    let error = context
        .create_object(CLSID_SERVICE_MANAGER, &config)
        .expect_err("non-bool rejected");
    assert_eq!(error.kind(), ErrorKind::TypeError);
}

#[rstest]
fn registry_is_shared_through_arc() {
    let context = example_context();
    let services: Arc<dyn ServiceRegistry> = Arc::new(manager(&context, LifecyclePolicy::Lenient));
    let worker = {
        let registry = Arc::clone(&services);
        std::thread::spawn(move || registry.start_service("example"))
    };
    worker
        .join()
        .expect("worker joins")
        .expect("service starts from another thread");
    assert!(flag(&context, "info.example.start"));
}

#[rstest]
fn descriptor_keys_stay_out_of_the_object_config() {
    let context = example_context();
    let _services = manager(&context, LifecyclePolicy::Lenient);
    assert_eq!(
        context
            .catalog()
            .get("info.example.configKeys")
            .expect("keys recorded"),
        Variant::Sequence(Vec::new())
    );
}

#[rstest]
fn declared_services_are_found_even_when_the_catalog_entry_changes() {
    let context = example_context();
    let services = manager(&context, LifecyclePolicy::Lenient);
    let created = services.query_service("example").expect("service found");
    context
        .catalog()
        .put("objects.example", Variant::from("replaced"))
        .expect("entry overwritten");

    let found = services.query_service("example").expect("service still found");
    assert_eq!(found.object_id(), created.object_id());
}
