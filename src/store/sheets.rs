// src/store/sheets.rs
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Row, Sheet, SheetStore};

/// Spreadsheet web-app endpoint: one URL, `{sheet, action, row?}` bodies.
#[derive(Clone)]
pub struct SheetsWebApp {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SheetRequest<'a> {
    sheet: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<&'a Row>,
}

#[derive(Deserialize)]
struct ReadResponse {
    success: bool,
    #[serde(default)]
    data: Vec<Row>,
    #[serde(default)]
    error: Option<String>,
}

impl SheetsWebApp {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// `SHEETS_WEBAPP_URL`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("SHEETS_WEBAPP_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    async fn post(&self, body: &SheetRequest<'_>) -> Result<reqwest::Response> {
        self.client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("sheets {} request ({})", body.action, body.sheet))?
            .error_for_status()
            .with_context(|| format!("sheets {} non-2xx ({})", body.action, body.sheet))
    }
}

#[async_trait::async_trait]
impl SheetStore for SheetsWebApp {
    async fn append(&self, sheet: Sheet, row: Row) -> Result<()> {
        let body = SheetRequest {
            sheet: sheet.name(),
            action: "append",
            row: Some(&row),
        };
        self.post(&body).await?;
        Ok(())
    }

    async fn read(&self, sheet: Sheet) -> Result<Vec<Row>> {
        let body = SheetRequest {
            sheet: sheet.name(),
            action: "read",
            row: None,
        };
        let resp: ReadResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .with_context(|| format!("sheets read body ({sheet})"))?;
        if !resp.success {
            return Err(anyhow!(
                "sheets read failed ({sheet}): {}",
                resp.error.unwrap_or_else(|| "unknown error".into())
            ));
        }
        Ok(resp.data)
    }

    fn name(&self) -> &'static str {
        "sheets"
    }
}
