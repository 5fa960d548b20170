//! On-demand qualify commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Serialize)]
struct QualifyRequest<'a> {
    endpoint: &'a str,
}

#[derive(Deserialize)]
struct ManagerResponse {
    response: String,
    message: String,
}

#[derive(Serialize)]
struct CliRequest<'a> {
    args: &'a [String],
}

#[derive(Deserialize)]
struct CliOutput {
    result: String,
    lines: Vec<String>,
}

/// Manager-style qualify. Returns the process exit code.
pub async fn cmd_qualify(port: u16, endpoint: &str) -> Result<i32> {
    let resp: ManagerResponse = post_json_body(
        &format!("{}/qualify", base_url(port)),
        &QualifyRequest { endpoint },
    )
    .await?;

    if resp.response == "Success" {
        println!("✓ {}", resp.message);
        Ok(0)
    } else {
        eprintln!("✗ {}", resp.message);
        Ok(1)
    }
}

/// `pjsip qualify <endpoint>` as the console would run it. Returns the
/// process exit code.
pub async fn cmd_pjsip_qualify(port: u16, args: &[String]) -> Result<i32> {
    let out: CliOutput = post_json_body(
        &format!("{}/cli/qualify", base_url(port)),
        &CliRequest { args },
    )
    .await?;

    for line in &out.lines {
        println!("{}", line);
    }
    Ok(match out.result.as_str() {
        "success" => 0,
        "showusage" => 2,
        _ => 1,
    })
}
