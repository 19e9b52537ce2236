use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use crate::reader::{ColumnSelector, LoadedRows, TableReader};

static SHEET_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("sheet id pattern is valid")
});

static SHEET_GID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#?&]gid=([0-9]+)").expect("gid pattern is valid"));

/// Turn a Google Sheet share/edit URL into its CSV export URL.
///
/// Only sheets readable by link can be fetched this way.
pub fn export_url(sheet_url: &str) -> Result<String> {
    let id = SHEET_ID
        .captures(sheet_url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .with_context(|| format!("Not a Google Sheet URL: {}", sheet_url))?;

    let gid = SHEET_GID
        .captures(sheet_url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("0");

    Ok(format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
        id, gid
    ))
}

#[derive(Clone)]
pub struct SheetReader {
    client: reqwest::Client,
}

impl SheetReader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn read_sheet(&self, sheet_url: &str, column: &ColumnSelector) -> Result<LoadedRows> {
        let url = export_url(sheet_url)?;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to Google Sheets")?;

        if !response.status().is_success() {
            anyhow::bail!("Google Sheets export failed: {}", response.status());
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read Google Sheets export")?;

        info!(bytes = body.len(), "Fetched sheet export");

        TableReader::read_csv(body.as_ref(), column)
    }
}

impl Default for SheetReader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}
