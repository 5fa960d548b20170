use crate::*;

use qualify_core::StatusType;
use qualify_services::{ProbeError, Store};

fn single_contact_store(aor_id: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint(aor_id, aor_id, "default"));
    store.upsert_aor(aor(aor_id, 0, &[]));
    store
}

/// S1: a 200 after ~500 µs marks the contact reachable with that RTT and
/// leaves it scheduled for the next round.
#[tokio::test]
async fn test_response_marks_contact_reachable() {
    let store = single_contact_store("100");
    let h = Harness::start(store.clone());

    let contact = registered("100", "sip:100@host.example", 60);
    store.add_contact(contact.clone()).unwrap();

    assert!(eventually(|| h.signalling.held() == 1).await, "probe not sent");
    let in_flight = store.status(&contact.id).unwrap();
    assert!(in_flight.in_flight(), "rtt_start must be set while outstanding");

    tokio::time::sleep(Duration::from_micros(500)).await;
    assert_eq!(h.signalling.resolve_all(ProbeOutcome::Response { code: 200 }), 1);

    let status = store.status(&contact.id).unwrap();
    assert_eq!(status.status, StatusType::Available);
    assert_eq!(status.last_status, StatusType::Created);
    assert!(status.rtt >= 500, "rtt {} too small", status.rtt);
    assert!(status.rtt < 3_000_000, "rtt {} too large", status.rtt);
    assert!(status.rtt_start.is_zero());
    assert!(h.qualifier.scheduler().is_scheduled(&contact.id));
    assert_eq!(h.signalling.sent_to(&contact.id), 1);
}

/// S2: a timeout marks the contact unreachable, moves the gauge and emits
/// the event with the wire keys.
#[tokio::test]
async fn test_timeout_marks_contact_unreachable() {
    let store = single_contact_store("100");
    let h = Harness::start(store.clone());
    let mut events = h.qualifier.events().subscribe();

    let contact = registered("100", "sip:100@host.example", 60);
    store.add_contact(contact.clone()).unwrap();
    assert!(eventually(|| h.signalling.held() == 1).await);
    h.signalling.resolve_all(ProbeOutcome::Timeout);

    let status = store.status(&contact.id).unwrap();
    assert_eq!(status.status, StatusType::Unavailable);
    assert_eq!(status.rtt, 0);
    assert!(status.rtt_start.is_zero());

    let gauges = h.qualifier.gauges();
    assert_eq!(gauges.get(StatusType::Unavailable), 1);
    assert_eq!(gauges.get(StatusType::Created), 0);

    let event = events.try_recv().unwrap();
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        serde_json::json!({ "Contact": contact.id, "Status": "Unreachable", "RTT": 0 })
    );
}

/// Non-Available outcomes always leave rtt and rtt_start at zero.
#[tokio::test]
async fn test_failed_outcomes_clear_rtt() {
    let store = single_contact_store("alice");
    let h = Harness::start(store.clone());

    let contact = registered("alice", "sip:alice@192.0.2.10", 60);
    store.add_contact(contact.clone()).unwrap();

    // First a success so there is an rtt to clear.
    assert!(eventually(|| h.signalling.held() == 1).await);
    h.signalling.resolve_all(ProbeOutcome::Response { code: 200 });
    assert!(store.status(&contact.id).unwrap().rtt > 0);

    for outcome in [
        ProbeOutcome::TransportError,
        ProbeOutcome::Other("transaction destroyed".into()),
    ] {
        h.qualifier
            .engine()
            .probe(None, Arc::new(contact.clone()))
            .unwrap();
        assert_eq!(h.signalling.resolve_all(outcome), 1);
        let status = store.status(&contact.id).unwrap();
        assert_eq!(status.status, StatusType::Unavailable);
        assert_eq!(status.rtt, 0);
        assert!(status.rtt_start.is_zero());
    }
}

/// A send failure is an immediate Unavailable.
#[tokio::test]
async fn test_dispatch_failure_marks_unavailable() {
    let store = single_contact_store("alice");
    let h = Harness::start(store.clone());
    h.signalling.fail_sends(true);

    let contact = registered("alice", "sip:alice@192.0.2.10", 60);
    store.add_contact(contact.clone()).unwrap();

    assert!(
        eventually(|| {
            store
                .status(&contact.id)
                .is_some_and(|s| s.status == StatusType::Unavailable)
        })
        .await
    );
    let status = store.status(&contact.id).unwrap();
    assert_eq!(status.rtt, 0);
    assert!(status.rtt_start.is_zero());
    assert_eq!(h.signalling.total_sent(), 0);
}

/// Orphan sweep: probing a contact no endpoint references deletes it.
#[tokio::test]
async fn test_orphan_contact_is_deleted() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice", "alice", "default"));
    store.upsert_aor(aor("ghost", 0, &[]));
    let h = Harness::start(store.clone());

    let contact = registered("ghost", "sip:ghost@192.0.2.66", 60);
    store.add_contact(contact.clone()).unwrap();

    assert!(eventually(|| store.contact(&contact.id).is_none()).await);
    assert!(store.status(&contact.id).is_none());
    assert!(!h.qualifier.scheduler().is_scheduled(&contact.id));
    assert_eq!(h.signalling.total_sent(), 0);

    // Direct probe of a contact the store never had.
    let stray = Arc::new(registered("ghost", "sip:stray@192.0.2.67", 0));
    assert_eq!(
        h.qualifier.engine().probe(None, stray.clone()),
        Err(ProbeError::NoEndpoint(stray.id.clone()))
    );
    assert!(store.status(&stray.id).is_none());
}

/// Endpoint resolution prefers `endpoint_name`, then an exact AOR match
/// among endpoints whose AOR list merely contains the name.
#[tokio::test]
async fn test_endpoint_resolution() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("alice-old", "alice2, alicex", "default"));
    store.upsert_endpoint(endpoint("alice", "bob, alice", "default"));
    store.upsert_endpoint(endpoint("named", "", "default"));
    store.upsert_aor(aor("alice", 0, &[]));
    let h = Harness::start(store.clone());

    let contact = registered("alice", "sip:alice@192.0.2.10", 0);
    let resolved = h.qualifier.engine().resolve_endpoint(&contact).unwrap();
    assert_eq!(resolved.id, "alice");

    let mut named = contact.clone();
    named.endpoint_name = "named".into();
    assert_eq!(
        h.qualifier.engine().resolve_endpoint(&named).unwrap().id,
        "named"
    );
}

/// Outbound proxy is carried on the request.
#[tokio::test]
async fn test_outbound_proxy_applied() {
    let store = single_contact_store("alice");
    let h = Harness::start(store.clone());

    let mut contact = registered("alice", "sip:alice@192.0.2.10", 60);
    contact.outbound_proxy = "sip:proxy.example;lr".into();
    store.add_contact(contact.clone()).unwrap();

    assert!(eventually(|| h.signalling.total_sent() == 1).await);
    let sent = h.signalling.sent();
    assert_eq!(
        sent[0].outbound_proxy.as_deref(),
        Some("sip:proxy.example;lr")
    );
    assert_eq!(sent[0].endpoint, "alice");
}
