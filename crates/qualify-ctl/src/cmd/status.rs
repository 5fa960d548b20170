//! Service-level commands: gauges, reload, AOR reconfiguration.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json, post_json_opt};

#[derive(Deserialize)]
struct MetricsResponse {
    gauges: BTreeMap<String, i64>,
    scheduled: usize,
}

#[derive(Deserialize)]
struct ReloadResponse {
    scheduled: usize,
}

#[derive(Deserialize)]
struct ReconfigureResponse {
    aor: String,
    contacts: Vec<String>,
}

pub async fn cmd_metrics(port: u16) -> Result<i32> {
    let resp: MetricsResponse = get_json(&format!("{}/metrics", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Qualify Metrics");
    println!("═══════════════════════════════════════");
    println!("  Scheduled contacts : {}", resp.scheduled);
    for (name, value) in &resp.gauges {
        println!("  {:<26} : {}", name, value);
    }
    Ok(0)
}

pub async fn cmd_reload(port: u16) -> Result<i32> {
    let resp: ReloadResponse = post_json(&format!("{}/reload", base_url(port))).await?;
    println!("✓ Reloaded, {} contacts scheduled.", resp.scheduled);
    Ok(0)
}

pub async fn cmd_reconfigure(port: u16, aor: &str) -> Result<i32> {
    let url = format!("{}/aors/{}/reconfigure", base_url(port), aor);
    let Some(resp) = post_json_opt::<ReconfigureResponse>(&url).await? else {
        eprintln!("Unable to find AOR {}.", aor);
        return Ok(1);
    };
    println!("✓ AOR {} rescheduled ({} contacts)", resp.aor, resp.contacts.len());
    for id in &resp.contacts {
        println!("  - {}", id);
    }
    Ok(0)
}
