use crate::*;

use qualify_core::{EndpointState, StatusType};
use qualify_services::Store;

/// S8: refreshing a Created row with qualify off resolves it to Unknown.
#[tokio::test]
async fn test_refresh_of_created_unqualified_contact() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start(store.clone());
    let mut events = h.qualifier.events().subscribe();

    let contact = Arc::new(registered("alice", "sip:alice@192.0.2.10", 0));
    let created = h.qualifier.statuses().find_or_create(&contact).unwrap();
    assert_eq!(created.status, StatusType::Created);
    assert_eq!(h.qualifier.gauges().get(StatusType::Created), 1);

    h.qualifier.engine().refresh(&contact);

    let status = store.status(&contact.id).unwrap();
    assert_eq!(status.status, StatusType::Unknown);
    assert_eq!(status.last_status, StatusType::Created);
    assert_eq!(status.rtt, 0);
    assert_eq!(events.try_recv().unwrap().status, "Unknown");
    assert_eq!(h.qualifier.gauges().get(StatusType::Created), 0);
    assert_eq!(h.qualifier.gauges().get(StatusType::Unknown), 1);

    // A second refresh is not a transition.
    h.qualifier.engine().refresh(&contact);
    assert!(events.try_recv().is_err());
    assert_eq!(store.status(&contact.id).unwrap().status, StatusType::Unknown);
}

/// A qualified contact in Created waits for its probe instead.
#[tokio::test]
async fn test_refresh_of_created_qualified_contact_is_silent() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start(store.clone());
    let mut events = h.qualifier.events().subscribe();

    let contact = Arc::new(registered("alice", "sip:alice@192.0.2.10", 60));
    h.qualifier.statuses().find_or_create(&contact).unwrap();
    h.qualifier.engine().refresh(&contact);

    assert_eq!(store.status(&contact.id).unwrap().status, StatusType::Created);
    assert!(events.try_recv().is_err());
}

/// Adding a contact with qualify off marks it Unknown straight away.
#[tokio::test]
async fn test_unqualified_contact_is_unknown() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start(store.clone());

    let contact = registered("alice", "sip:alice@192.0.2.10", 0);
    store.add_contact(contact.clone()).unwrap();

    let status = store.status(&contact.id).unwrap();
    assert_eq!(status.status, StatusType::Unknown);
    assert!(!h.qualifier.scheduler().is_scheduled(&contact.id));
    assert_eq!(h.signalling.total_sent(), 0);
}

/// Create then delete leaves neither a status row nor a schedule entry.
#[tokio::test]
async fn test_contact_create_then_delete() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start_with(
        store.clone(),
        StubSignalling::answering(ProbeOutcome::Response { code: 200 }),
    );

    let contact = registered("alice", "sip:alice@192.0.2.10", 60);
    store.add_contact(contact.clone()).unwrap();
    assert!(
        eventually(|| {
            store
                .status(&contact.id)
                .is_some_and(|s| s.status == StatusType::Available)
        })
        .await
    );
    assert_eq!(h.qualifier.gauges().get(StatusType::Available), 1);

    store.delete_contact(&contact.id).unwrap();

    assert!(store.status(&contact.id).is_none());
    assert!(!h.qualifier.scheduler().is_scheduled(&contact.id));
    assert_eq!(h.qualifier.gauges().get(StatusType::Available), 0);
}

/// Endpoints that are never probed are marked online at start.
#[tokio::test]
async fn test_unqualified_endpoints_marked_online() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("quiet", "quiet", "default"));
    store.upsert_endpoint(endpoint("bob", "bob", "default"));
    store.upsert_endpoint(endpoint("trunk", "trunk", "default"));
    store.upsert_aor(aor("quiet", 0, &["sip:quiet.example"]));
    store.upsert_aor(aor("bob", 0, &[]));
    store.upsert_aor(aor("trunk", 30, &["sip:gw.example"]));

    let mut phone = registered("bob", "sip:bob@192.0.2.20", 0);
    phone.endpoint_name = "bob".into();
    store.add_contact(phone).unwrap();

    let _h = Harness::start(store.clone());

    assert_eq!(store.endpoint_state("quiet"), EndpointState::Online);
    assert_eq!(store.endpoint_state("bob"), EndpointState::Online);
    assert_eq!(store.endpoint_state("trunk"), EndpointState::Offline);
}

/// A permanent contact created after boot is qualified exactly once: the
/// creation qualify already scheduled it, so the initial qualify stands down.
#[tokio::test]
async fn test_initial_qualify_after_boot() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("trunk", "trunk", "default"));
    let h = Harness::start_with(
        store.clone(),
        StubSignalling::answering(ProbeOutcome::Response { code: 200 }),
    );
    h.qualifier.mark_fully_booted();

    store.upsert_aor(aor("trunk", 60, &["sip:gw.example"]));
    let id = "trunk@@sip:gw.example";

    assert!(
        eventually(|| store.status(id).map(|s| s.status) == Some(StatusType::Available)).await
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.signalling.sent_to(id), 1);
    assert!(h.qualifier.scheduler().is_scheduled(id));
}
