//! Contact listing commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, get_json_opt};

#[derive(Deserialize)]
struct EndpointContactsResponse {
    endpoint: String,
    contacts: Vec<ContactDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContactDetail {
    #[serde(rename = "AOR")]
    aor: String,
    #[serde(rename = "URI")]
    uri: String,
    status: String,
    roundtrip_usec: String,
    qualify_frequency: u32,
    qualify_timeout: String,
    #[serde(default, rename = "ViaAddress")]
    via_address: Option<String>,
    user_agent: String,
}

#[derive(Deserialize)]
struct StatusesResponse {
    statuses: Vec<ContactStatus>,
}

#[derive(Deserialize)]
struct ContactStatus {
    id: String,
    status: u32,
    last_status: u32,
    rtt: u64,
}

/// Label for a persisted status ordinal.
fn status_label(ordinal: u32) -> &'static str {
    match ordinal {
        0 => "Unreachable",
        1 => "Reachable",
        2 => "Unknown",
        3 => "Created",
        4 => "Removed",
        _ => "?",
    }
}

pub async fn cmd_contacts(port: u16, endpoint: &str) -> Result<i32> {
    let url = format!("{}/endpoints/{}/contacts", base_url(port), endpoint);
    let Some(resp) = get_json_opt::<EndpointContactsResponse>(&url).await? else {
        eprintln!("Unable to find object {}.", endpoint);
        return Ok(1);
    };

    if resp.contacts.is_empty() {
        println!("Endpoint {} has no contacts.", resp.endpoint);
        return Ok(0);
    }

    println!("═══════════════════════════════════════");
    println!("  Contacts of {} ({})", resp.endpoint, resp.contacts.len());
    println!("═══════════════════════════════════════");
    for c in &resp.contacts {
        println!("  ┌─ {}", c.uri);
        println!("  │  aor       : {}", c.aor);
        println!("  │  status    : {}", c.status);
        println!("  │  rtt (us)  : {}", c.roundtrip_usec);
        println!(
            "  │  qualify   : every {}s, timeout {}s",
            c.qualify_frequency, c.qualify_timeout
        );
        if let Some(via) = &c.via_address {
            println!("  │  via       : {}", via);
        }
        println!("  └─ agent     : {}", c.user_agent);
    }
    Ok(0)
}

pub async fn cmd_statuses(port: u16) -> Result<i32> {
    let resp: StatusesResponse = get_json(&format!("{}/statuses", base_url(port))).await?;

    if resp.statuses.is_empty() {
        println!("No contact statuses yet.");
        return Ok(0);
    }

    println!("{:<48} {:<12} {:<12} {:>10}", "CONTACT", "STATUS", "PREVIOUS", "RTT (us)");
    for s in &resp.statuses {
        println!(
            "{:<48} {:<12} {:<12} {:>10}",
            s.id,
            status_label(s.status),
            status_label(s.last_status),
            s.rtt
        );
    }
    Ok(0)
}
