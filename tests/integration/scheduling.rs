use crate::*;

use qualify_core::StatusType;
use qualify_services::scheduler::jittered_delay_ms;
use qualify_services::Store;

fn trunk_store(frequency: u32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("trunk", "trunk", "default"));
    store.upsert_aor(aor(
        "trunk",
        frequency,
        &["sip:gw1.example", "sip:gw2.example"],
    ));
    store
}

/// S7: dropping the AOR frequency to zero unschedules its contacts and
/// marks them Unknown.
#[tokio::test]
async fn test_aor_frequency_zero_unschedules() {
    let store = trunk_store(30);
    let h = Harness::start(store.clone());
    assert_eq!(h.qualifier.scheduler().len(), 2);

    store.upsert_aor(aor("trunk", 0, &["sip:gw1.example", "sip:gw2.example"]));

    assert!(h.qualifier.scheduler().is_empty());
    for id in ["trunk@@sip:gw1.example", "trunk@@sip:gw2.example"] {
        assert_eq!(store.status(id).unwrap().status, StatusType::Unknown);
        assert_eq!(store.contact(id).unwrap().qualify_frequency, 0);
    }
}

/// A frequency brought back above zero puts the contacts back on the
/// schedule without probing them on the spot.
#[tokio::test]
async fn test_aor_frequency_raised_reschedules() {
    let store = trunk_store(0);
    let h = Harness::start(store.clone());
    assert!(h.qualifier.scheduler().is_empty());

    store.upsert_aor(aor("trunk", 3600, &["sip:gw1.example", "sip:gw2.example"]));
    assert_eq!(
        h.qualifier.scheduler().scheduled_ids(),
        vec!["trunk@@sip:gw1.example", "trunk@@sip:gw2.example"]
    );
    assert_eq!(h.signalling.total_sent(), 0);
}

#[tokio::test]
async fn test_unschedule_stops_probing() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start_with(
        store.clone(),
        StubSignalling::answering(ProbeOutcome::Response { code: 200 }),
    );

    let contact = registered("alice", "sip:alice@192.0.2.10", 1);
    store.add_contact(contact.clone()).unwrap();
    assert!(eventually(|| h.signalling.sent_to(&contact.id) >= 2).await);

    h.qualifier.scheduler().unschedule(&contact.id);
    assert!(!h.qualifier.scheduler().is_scheduled(&contact.id));
    let after = h.signalling.sent_to(&contact.id);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    // At most the round that was already running.
    assert!(h.signalling.sent_to(&contact.id) <= after + 1);
}

/// Reloading twice gives the same schedule.
#[tokio::test]
async fn test_reload_is_idempotent() {
    let store = trunk_store(30);
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    store
        .add_contact(registered("alice", "sip:alice@192.0.2.10", 60))
        .unwrap();
    let h = Harness::start(store.clone());

    let first = h.qualifier.reload();
    let ids = h.qualifier.scheduler().scheduled_ids();
    assert_eq!(first, 3);
    assert_eq!(h.qualifier.reload(), 3);
    assert_eq!(h.qualifier.scheduler().scheduled_ids(), ids);
}

#[test]
fn test_initial_jitter_is_bounded() {
    for _ in 0..1000 {
        assert!(jittered_delay_ms(5, 60) < 5_000);
        assert!(jittered_delay_ms(0, 7) < 7_000);
        assert!(jittered_delay_ms(100, 7) < 7_000);
    }
    assert_eq!(jittered_delay_ms(10, 0), 0);
}

#[tokio::test]
async fn test_shutdown_stops_probing() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start_with(
        store.clone(),
        StubSignalling::answering(ProbeOutcome::Response { code: 200 }),
    );

    let contact = registered("alice", "sip:alice@192.0.2.10", 1);
    store.add_contact(contact.clone()).unwrap();
    assert!(eventually(|| h.signalling.sent_to(&contact.id) >= 1).await);

    h.qualifier.shutdown();
    assert!(h.qualifier.scheduler().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = h.signalling.total_sent();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.signalling.total_sent(), after);

    // Contact changes no longer reach the schedule.
    store
        .add_contact(registered("alice", "sip:late@192.0.2.11", 1))
        .unwrap();
    assert!(h.qualifier.scheduler().is_empty());
}

#[tokio::test]
async fn test_delete_aor_unschedules_contacts() {
    let store = trunk_store(30);
    let h = Harness::start(store.clone());
    assert_eq!(h.qualifier.scheduler().len(), 2);

    store.delete_aor("trunk").unwrap();

    assert!(h.qualifier.scheduler().is_empty());
    assert!(store.contact("trunk@@sip:gw1.example").is_none());
    assert!(store.status("trunk@@sip:gw1.example").is_none());
}
