//! Allocation races and registration retries

use catalog_registry::{Device, Heartbeat, Patient, Registration, Service};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

mod common;
use common::{Script, ScriptedCatalog, TestCatalog};

const FAST: Duration = Duration::from_millis(10);

/// A client that allocated from an outdated view is rejected and allocates again
#[smol_potat::test]
async fn test_conflict_forces_reallocation() {
    let t = TestCatalog::new().await;
    t.registry.create(Service::new(1, "bot")).await.unwrap();

    let api = Arc::new(ScriptedCatalog::new(
        t.registry.clone(),
        Script {
            stale_lists: 1,
            ..Script::default()
        },
    ));
    let mut registration =
        Registration::with_intervals(api.clone(), Service::new(0, "adaptor"), FAST, FAST);

    assert_eq!(registration.register().await, 2);
    assert_eq!(api.creates.load(Ordering::SeqCst), 2);
    assert_eq!(t.registry.get::<Service>(&1).await.unwrap().service_name, "bot");
    assert_eq!(t.registry.get::<Service>(&2).await.unwrap().service_name, "adaptor");
}

/// Two clients racing for the same ID both end up registered under distinct IDs
#[smol_potat::test]
async fn test_racing_clients_get_distinct_ids() {
    let t = TestCatalog::new().await;
    let api = Arc::new(ScriptedCatalog::new(
        t.registry.clone(),
        Script {
            stale_lists: 2,
            ..Script::default()
        },
    ));

    let mut first = Registration::with_intervals(api.clone(), Service::new(0, "bot"), FAST, FAST);
    let mut second =
        Registration::with_intervals(api.clone(), Service::new(0, "adaptor"), FAST, FAST);

    let (a, b) = futures::join!(first.register(), second.register());
    assert_ne!(a, b);

    let mut ids: Vec<_> = t
        .registry
        .list::<Service>()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}

/// Unreachable catalog is retried until it answers
#[smol_potat::test]
async fn test_transport_failures_are_retried() {
    let t = TestCatalog::new().await;
    let api = Arc::new(ScriptedCatalog::new(
        t.registry.clone(),
        Script {
            failed_lists: 3,
            failed_creates: 2,
            ..Script::default()
        },
    ));

    let mut registration =
        Registration::with_intervals(api.clone(), Service::new(0, "stats"), FAST, FAST);
    let id = registration.register().await;

    assert_eq!(id, 1);
    assert_eq!(registration.id(), Some(1));
    assert_eq!(api.creates.load(Ordering::SeqCst), 3);
    assert!(api.lists.load(Ordering::SeqCst) >= 6);
}

/// A sensor whose patient is not there yet keeps its ID and waits
#[smol_potat::test]
async fn test_device_waits_for_patient() {
    let t = TestCatalog::new().await;
    let mut sensor = Registration::with_intervals(
        t.registry.clone(),
        Device::new(0, "oximeter", 4),
        FAST,
        FAST,
    );

    let registry = t.registry.clone();
    let add_patient = async move {
        async_io::Timer::after(Duration::from_millis(50)).await;
        registry.create(Patient::new(4, "Ada", "Lovelace")).await.unwrap();
    };

    let (id, ()) = futures::join!(sensor.register(), add_patient);
    assert_eq!(id, 1);
    assert_eq!(t.registry.get::<Patient>(&4).await.unwrap().devices, vec![1]);
}

/// A client reaped between heartbeats comes back
#[smol_potat::test]
async fn test_reaped_client_reregisters() {
    let t = TestCatalog::new().await;
    let mut registration =
        Registration::with_intervals(t.registry.clone(), Service::new(0, "bot"), FAST, FAST);
    let id = registration.register().await;

    t.registry.delete::<Service>(&id).await.unwrap();
    t.registry.create(Service::new(id, "squatter")).await.unwrap();

    match registration.heartbeat().await {
        Heartbeat::Reregistered(new_id) => {
            assert_ne!(new_id, id);
            assert_eq!(registration.record().id, new_id);
        }
        other => panic!("expected re-registration, got {:?}", other),
    }
}
