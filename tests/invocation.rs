//! Round trips, callbacks and routing through a registry.

mod common;

use std::sync::Arc;

use common::{Account, AccountError, Callback, Recorder, Service, TestService, Wallet};
use courier::{
    bus::{Destination, MemoryBus},
    error::ExportError,
    Registry, Remote, RemoteError,
};

fn registry() -> Registry {
    common::init_tracing();
    Registry::builder().build().unwrap()
}

#[test]
fn exported_object_answers_through_its_proxy() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));

    let proxy = registry.export(&service).unwrap();

    assert_eq!(proxy.hello().unwrap(), "hello");
    assert_eq!(proxy.echo(42).unwrap(), 42);
    assert!(proxy.remote_ref().is_some());
    assert!(service.remote_ref().is_none());
    registry.reset();
}

#[test]
fn callback_argument_is_invoked_in_the_calling_process() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    let proxy = registry.export(&service).unwrap();

    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn Callback> = recorder.clone();
    proxy.world(callback).unwrap();

    assert_eq!(recorder.values(), vec!["world"]);
    registry.reset();
}

#[test]
fn callback_is_exported_once_across_calls() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    let proxy = registry.export(&service).unwrap();
    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn Callback> = recorder.clone();

    proxy.world(callback.clone()).unwrap();
    assert_eq!(registry.export_count(), 2);
    proxy.world(callback.clone()).unwrap();
    assert_eq!(registry.export_count(), 2);

    assert_eq!(recorder.values(), vec!["world", "world"]);
    assert!(registry.unexport(&callback));
    assert_eq!(registry.export_count(), 1);
    registry.reset();
}

#[test]
fn well_known_destinations_route_independently() {
    let registry = registry();
    let foo: Arc<dyn Service> = Arc::new(TestService::new("foo"));
    let bar: Arc<dyn Service> = Arc::new(TestService::new("bar"));
    registry
        .export_at(&foo, Destination::well_known("FOO"))
        .unwrap();
    registry
        .export_at(&bar, Destination::well_known("BAR"))
        .unwrap();

    let foo_proxy = registry.lookup::<dyn Service>(Destination::well_known("FOO"));
    let bar_proxy = registry.lookup::<dyn Service>(Destination::well_known("BAR"));
    for _ in 0..10 {
        assert_eq!(foo_proxy.hello().unwrap(), "foo");
        assert_eq!(bar_proxy.hello().unwrap(), "bar");
    }
    registry.reset();
}

#[test]
fn callback_exported_at_a_well_known_destination_is_reused() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("foo"));
    registry
        .export_at(&service, Destination::well_known("FOO"))
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn Callback> = recorder.clone();
    registry
        .export_at(&callback, Destination::well_known("BAR"))
        .unwrap();

    let proxy = registry.lookup::<dyn Service>(Destination::well_known("FOO"));
    proxy.world(callback).unwrap();

    assert_eq!(recorder.values(), vec!["world"]);
    assert_eq!(registry.export_count(), 2);

    // The callback can also be reached directly at its well-known name.
    let direct = registry.lookup::<dyn Callback>(Destination::well_known("BAR"));
    direct.execute("direct".to_string()).unwrap();
    assert_eq!(recorder.values(), vec!["world", "direct"]);
    registry.reset();
}

#[test]
fn re_export_is_idempotent() {
    let registry = registry();
    let wallet: Arc<dyn Account> = Arc::new(Wallet::new(100));
    let foo = Destination::well_known("FOO");

    let first = registry.export_at(&wallet, foo.clone()).unwrap();
    let second = registry.export_at(&wallet, foo.clone()).unwrap();
    let anonymous = registry.export(&wallet).unwrap();
    assert_eq!(registry.export_count(), 1);
    assert_eq!(anonymous.remote_ref().unwrap().destination(), &foo);

    // Both proxies observe the same object.
    assert_eq!(first.withdraw(30).unwrap(), 70);
    assert_eq!(second.withdraw(30).unwrap(), 40);

    let other: Arc<dyn Account> = Arc::new(Wallet::new(0));
    assert!(matches!(
        registry.export_at(&other, foo.clone()),
        Err(ExportError::DestinationInUse(destination)) if destination == foo
    ));
    assert!(matches!(
        registry.export_at(&wallet, Destination::well_known("BAZ")),
        Err(ExportError::AlreadyExported(destination)) if destination == foo
    ));
    registry.reset();
}

#[test]
fn exporting_a_proxy_returns_its_reference() {
    let registry = registry();
    let wallet: Arc<dyn Account> = Arc::new(Wallet::new(100));
    let foo = Destination::well_known("FOO");
    let proxy = registry.export_at(&wallet, foo.clone()).unwrap();

    let again = registry.export(&proxy).unwrap();
    let at_same = registry.export_at(&proxy, foo.clone()).unwrap();
    assert_eq!(registry.export_count(), 1);
    assert_eq!(
        again.remote_ref().unwrap().object(),
        proxy.remote_ref().unwrap().object()
    );
    assert_eq!(at_same.remote_ref().unwrap().destination(), &foo);

    let looked_up = registry.lookup::<dyn Account>(foo.clone());
    assert!(matches!(
        registry.export_at(&looked_up, Destination::well_known("BAZ")),
        Err(ExportError::AlreadyExported(destination)) if destination == foo
    ));
    assert_eq!(registry.export_count(), 1);

    // Calls still reach the original object.
    assert_eq!(again.withdraw(30).unwrap(), 70);
    registry.reset();
}

#[test]
fn declared_errors_round_trip() {
    let registry = registry();
    let wallet: Arc<dyn Account> = Arc::new(Wallet::new(100));
    let proxy = registry.export(&wallet).unwrap();

    assert_eq!(
        proxy.withdraw(500),
        Err(AccountError::InsufficientFunds { available: 100 })
    );
    assert_eq!(proxy.withdraw(60), Ok(40));
    assert_eq!(proxy.owners().unwrap(), vec!["ada", "grace"]);
    registry.reset();
}

#[test]
fn sequences_and_optionals_of_callbacks_are_walked() {
    common::init_tracing();
    let bus = Arc::new(MemoryBus::new());
    let server = Registry::new(bus.clone()).unwrap();
    let client = Registry::new(bus).unwrap();

    let wallet: Arc<dyn Account> = Arc::new(Wallet::new(100));
    server
        .export_at(&wallet, Destination::well_known("WALLET"))
        .unwrap();
    let account = client.lookup::<dyn Account>(Destination::well_known("WALLET"));
    assert!(account.first_watcher().unwrap().is_none());

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let watchers: Vec<Arc<dyn Callback>> = vec![first.clone(), second.clone()];
    assert_eq!(account.watch(watchers).unwrap(), 2);
    assert_eq!(client.export_count(), 2);

    assert_eq!(account.withdraw(10).unwrap(), 90);
    assert_eq!(first.values(), vec!["withdrew 10"]);
    assert_eq!(second.values(), vec!["withdrew 10"]);

    // The server hands back the proxy it holds, which points at the client's own export.
    let watcher = account.first_watcher().unwrap().unwrap();
    assert_eq!(client.export_count(), 2);
    watcher.execute("back home".to_string()).unwrap();
    assert_eq!(first.values(), vec!["withdrew 10", "back home"]);

    server.reset();
    client.reset();
}

#[test]
fn registries_sharing_a_bus_call_each_other() {
    common::init_tracing();
    let bus = Arc::new(MemoryBus::new());
    let server = Registry::new(bus.clone()).unwrap();
    let client = Registry::new(bus.clone()).unwrap();

    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    server
        .export_at(&service, Destination::well_known("FOO"))
        .unwrap();

    let proxy = client.lookup::<dyn Service>(Destination::well_known("FOO"));
    assert_eq!(proxy.hello().unwrap(), "hello");

    let recorder = Arc::new(Recorder::default());
    proxy.world(recorder.clone()).unwrap();
    assert_eq!(recorder.values(), vec!["world"]);
    assert_eq!(server.export_count(), 1);
    assert_eq!(client.export_count(), 1);

    // A second registry cannot consume a queue the first one serves.
    let impostor: Arc<dyn Service> = Arc::new(TestService::new("impostor"));
    assert!(matches!(
        client.export_at(&impostor, Destination::well_known("FOO")),
        Err(ExportError::Bus(_))
    ));
    assert_eq!(client.export_count(), 1);

    server.reset();
    client.reset();
}

#[test]
fn panics_are_contained() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    let proxy = registry.export(&service).unwrap();

    assert_eq!(
        proxy.crash(),
        Err(RemoteError::InvocationPanicked("service crashed".to_string()))
    );
    assert_eq!(proxy.hello().unwrap(), "hello");
    registry.reset();
}

#[test]
fn wrong_interface_has_no_such_method() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    registry
        .export_at(&service, Destination::well_known("FOO"))
        .unwrap();

    let account = registry.lookup::<dyn Account>(Destination::well_known("FOO"));
    assert_eq!(
        account.withdraw(1),
        Err(AccountError::Remote(RemoteError::NoSuchMethod(
            "withdraw(u64)".to_string()
        )))
    );
    registry.reset();
}

#[test]
fn stale_references_are_rejected() {
    let registry = registry();
    let foo = Destination::well_known("FOO");
    let old: Arc<dyn Service> = Arc::new(TestService::new("old"));
    let stale = registry.export_at(&old, foo.clone()).unwrap();
    assert!(registry.unexport(&old));
    assert!(!registry.unexport(&old));

    let new: Arc<dyn Service> = Arc::new(TestService::new("new"));
    registry.export_at(&new, foo.clone()).unwrap();

    assert_eq!(stale.hello(), Err(RemoteError::NoSuchObject(foo.clone())));
    let fresh = registry.lookup::<dyn Service>(foo);
    assert_eq!(fresh.hello().unwrap(), "new");
    registry.reset();
}

#[test]
fn calls_to_released_anonymous_destinations_fail() {
    let registry = registry();
    let service: Arc<dyn Service> = Arc::new(TestService::new("hello"));
    let proxy = registry.export(&service).unwrap();
    let destination = proxy.remote_ref().unwrap().destination().clone();

    assert!(registry.unexport_destination(&destination));
    assert!(!registry.unexport_destination(&destination));

    assert_eq!(proxy.hello(), Err(RemoteError::NoSuchObject(destination)));
    assert_eq!(registry.pending_count(), 0);
    registry.reset();
}
