//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

async fn send<R: for<'de> Deserialize<'de>>(url: &str, req: RequestBuilder) -> Result<Option<R>> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("failed to connect to qualifyd at {} (is it running?)", url))?;
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let resp = resp
        .error_for_status()
        .with_context(|| format!("request to {} failed", url))?;
    resp.json::<R>()
        .await
        .context("failed to parse response")
        .map(Some)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    get_json_opt(url)
        .await?
        .with_context(|| format!("{} not found", url))
}

/// Like `get_json`, but a 404 yields `None`.
pub async fn get_json_opt<T: for<'de> Deserialize<'de>>(url: &str) -> Result<Option<T>> {
    send(url, reqwest::Client::new().get(url)).await
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    post_json_opt(url)
        .await?
        .with_context(|| format!("{} not found", url))
}

/// Like `post_json`, but a 404 yields `None`.
pub async fn post_json_opt<T: for<'de> Deserialize<'de>>(url: &str) -> Result<Option<T>> {
    send(url, reqwest::Client::new().post(url)).await
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    send(url, reqwest::Client::new().post(url).json(body))
        .await?
        .with_context(|| format!("{} not found", url))
}
