use crate::*;

use qualify_core::StatusType;
use qualify_services::{CliResult, ManagerResponse, Store, StoreError};

const GW1: &str = "trunk@@sip:gw1.example";
const GW2: &str = "trunk@@sip:gw2.example";

fn trunk(frequency: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.upsert_endpoint(endpoint("trunk", "trunk", "default"));
    store.upsert_endpoint(endpoint("bare", "", "default"));
    store.upsert_aor(aor(
        "trunk",
        frequency,
        &["sip:gw1.example", "sip:gw2.example"],
    ));
    Harness::start_with(
        store,
        StubSignalling::answering(ProbeOutcome::Response { code: 200 }),
    )
}

fn words(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[tokio::test]
async fn test_cli_qualify_probes_every_contact() {
    let h = trunk(0);
    let admin = h.qualifier.admin();

    let out = admin.cli_qualify(&words(&["trunk"]));
    assert_eq!(out.result, CliResult::Success);
    assert_eq!(
        out.lines,
        vec![
            "Sending qualify to endpoint trunk".to_string(),
            " contact sip:gw1.example".to_string(),
            " contact sip:gw2.example".to_string(),
        ]
    );

    assert!(eventually(|| h.signalling.sent_to(GW1) == 1 && h.signalling.sent_to(GW2) == 1).await);
    assert!(
        eventually(|| {
            [GW1, GW2].iter().all(|id| {
                h.store
                    .status(id)
                    .is_some_and(|s| s.status == StatusType::Available)
            })
        })
        .await
    );
    // One-shot: nothing is put on the schedule.
    assert!(h.qualifier.scheduler().is_empty());
}

#[tokio::test]
async fn test_cli_qualify_errors() {
    let h = trunk(0);
    let admin = h.qualifier.admin();

    assert_eq!(admin.cli_qualify(&[]).result, CliResult::ShowUsage);
    assert_eq!(
        admin.cli_qualify(&words(&["trunk", "extra"])).result,
        CliResult::ShowUsage
    );

    let out = admin.cli_qualify(&words(&["ghost"]));
    assert_eq!(out.result, CliResult::Failure);
    assert_eq!(out.lines, vec!["Unable to retrieve endpoint ghost"]);

    let out = admin.cli_qualify(&words(&["bare"]));
    assert_eq!(out.result, CliResult::Success);
    assert_eq!(out.lines, vec!["Endpoint bare has no AoR's configured"]);
    assert_eq!(h.signalling.total_sent(), 0);
}

#[tokio::test]
async fn test_manager_qualify() {
    let h = trunk(0);
    let admin = h.qualifier.admin();

    assert_eq!(
        admin.ami_qualify(None),
        ManagerResponse::Error("Endpoint parameter missing.".into())
    );
    assert_eq!(
        admin.ami_qualify(Some("ghost")),
        ManagerResponse::Error("Unable to retrieve endpoint".into())
    );
    assert_eq!(
        admin.ami_qualify(Some("bare")),
        ManagerResponse::Error("No AoRs configured for endpoint".into())
    );
    assert_eq!(
        admin.ami_qualify(Some("trunk")),
        ManagerResponse::Success("Endpoint found, will qualify".into())
    );
    assert!(eventually(|| h.signalling.total_sent() == 2).await);
}

#[tokio::test]
async fn test_contact_status_details() {
    let h = trunk(0);
    let admin = h.qualifier.admin();
    assert!(admin.contact_status_details("ghost").is_none());
    assert!(admin.contact_status_details("bare").unwrap().is_empty());

    // Qualify off: every contact reports Unknown without a round trip.
    let details = admin.contact_status_details("trunk").unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().all(|d| d.status == "Unknown" && d.roundtrip_usec == "N/A"));

    admin.cli_qualify(&words(&["trunk"]));
    assert!(
        eventually(|| {
            admin
                .contact_status_details("trunk")
                .is_some_and(|ds| ds.iter().all(|d| d.status == "Reachable"))
        })
        .await
    );

    let details = admin.contact_status_details("trunk").unwrap();
    let gw1 = details.iter().find(|d| d.id == GW1).unwrap();
    assert_eq!(gw1.aor, "trunk");
    assert_eq!(gw1.endpoint_name, "trunk");
    assert_ne!(gw1.roundtrip_usec, "N/A");
    let text = gw1.to_ami();
    assert!(text.starts_with("Event: ContactStatusDetail\r\n"));
    assert!(text.contains("Status: Reachable\r\n"));
    assert!(text.contains("ID: trunk@@sip:gw1.example\r\n"));
}

#[tokio::test]
async fn test_reconfigure_aor() {
    let h = trunk(30);
    h.qualifier.scheduler().unschedule_all();

    let mut rescheduled = h.qualifier.admin().reconfigure_aor("trunk").unwrap();
    rescheduled.sort();
    assert_eq!(rescheduled, vec![GW1, GW2]);
    assert_eq!(h.qualifier.scheduler().scheduled_ids(), vec![GW1, GW2]);

    assert!(matches!(
        h.qualifier.admin().reconfigure_aor("ghost"),
        Err(StoreError::NotFound { .. })
    ));
}
