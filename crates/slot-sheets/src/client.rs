//! # Row API Client
//!
//! Thin HTTP client over a SheetDB-style API:
//!
//! - `GET    {base}?sheet=<table>`                 → `[{column: value, ...}]`
//! - `POST   {base}?sheet=<table>`                 ← `{"data": [row]}`
//! - `PATCH  {base}/<column>/<value>?sheet=<table>` ← `{"data": {...}}`

use crate::config::SheetsConfig;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use slot_core::{BookingError, BookingResult};
use tracing::{debug, error};

/// One spreadsheet row, column name to cell
pub type Row = Map<String, Value>;

pub struct SheetsClient {
    config: SheetsConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    updated: u64,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> BookingResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BookingError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, table: &str, segments: &[&str]) -> BookingResult<Url> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| BookingError::Configuration(format!("SHEETS_API_URL: {}", e)))?;
        if !segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| BookingError::Configuration("SHEETS_API_URL cannot be a base".into()))?
                .pop_if_empty()
                .extend(segments);
        }
        url.query_pairs_mut().append_pair("sheet", table);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.api_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> BookingResult<String> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| BookingError::Store(format!("row API unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BookingError::Store(e.to_string()))?;

        if !status.is_success() {
            error!("Row API error: status={}, body={}", status, body);
            return Err(BookingError::Store(format!("row API HTTP {}", status)));
        }
        Ok(body)
    }

    /// Every row of `table`
    pub async fn rows(&self, table: &str) -> BookingResult<Vec<Row>> {
        let url = self.url(table, &[])?;
        let body = self.send(self.client.get(url)).await?;
        let rows: Vec<Row> = serde_json::from_str(&body)
            .map_err(|e| BookingError::Store(format!("{} rows unreadable: {}", table, e)))?;
        debug!("Fetched {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    pub async fn append(&self, table: &str, row: Row) -> BookingResult<()> {
        let url = self.url(table, &[])?;
        self.send(self.client.post(url).json(&json!({ "data": [row] })))
            .await?;
        Ok(())
    }

    /// Patch every row where `column == value`; returns how many matched
    pub async fn update_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
        changes: Row,
    ) -> BookingResult<u64> {
        let url = self.url(table, &[column, value])?;
        let body = self
            .send(self.client.patch(url).json(&json!({ "data": changes })))
            .await?;
        Ok(serde_json::from_str::<UpdateResponse>(&body)
            .map(|r| r.updated)
            .unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = SheetsClient::new(SheetsConfig::new("https://rows.example/api/v1/abc")).unwrap();

        let url = client.url("bookings", &[]).unwrap();
        assert_eq!(url.as_str(), "https://rows.example/api/v1/abc?sheet=bookings");

        let url = client.url("settings", &["key", "admin email"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://rows.example/api/v1/abc/key/admin%20email?sheet=settings"
        );
    }
}
