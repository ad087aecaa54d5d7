//! Google Sheets implementation of the [`Ledger`] capability.
//!
//! Works against the values REST API with a bearer token. The ledger
//! reference is either a bare spreadsheet id or a full sheet URL; the
//! id is extracted from the `/d/<id>/` segment in the latter case.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Ledger, LedgerError};
use crate::roster::Decision;

const HEADER_ROW: [&str; 3] = ["Email", "Number of Pings", "Decision"];

/// Extract the spreadsheet id from a reference that may be a full
/// sheet URL.
pub fn sheet_id(reference: &str) -> &str {
    match reference.split_once("/d/") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
        None => reference,
    }
}

pub struct SheetLedger {
    client: Client,
    token: String,
    base_url: String,
}

impl SheetLedger {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            token: token.into(),
            base_url: "https://sheets.googleapis.com".to_string(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Api(format!("GET {path}: HTTP {status}")));
        }
        Ok(resp.json().await?)
    }

    async fn write(&self, method: reqwest::Method, path: &str, body: Value) -> Result<(), LedgerError> {
        let resp = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Api(format!("{path}: HTTP {status}")));
        }
        Ok(())
    }

    /// 1-based row number of the email in column A, if present.
    async fn find_row(&self, id: &str, email: &str) -> Result<Option<usize>, LedgerError> {
        let payload = self
            .get(&format!("/v4/spreadsheets/{id}/values/Sheet1!A:A"))
            .await?;
        let rows = payload["values"].as_array().cloned().unwrap_or_default();
        for (i, row) in rows.iter().enumerate() {
            if row.get(0).and_then(Value::as_str) == Some(email) {
                return Ok(Some(i + 1));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Ledger for SheetLedger {
    async fn verify_access(&self, reference: &str) -> Result<(), LedgerError> {
        let id = sheet_id(reference);
        self.get(&format!("/v4/spreadsheets/{id}?fields=spreadsheetId"))
            .await?;
        Ok(())
    }

    async fn initialize(&self, reference: &str) -> Result<(), LedgerError> {
        let id = sheet_id(reference);
        self.write(
            reqwest::Method::PUT,
            &format!("/v4/spreadsheets/{id}/values/Sheet1!A1:C1?valueInputOption=RAW"),
            json!({ "values": [HEADER_ROW] }),
        )
        .await
    }

    async fn upsert_row(
        &self,
        reference: &str,
        email: &str,
        ping_count: u32,
        decision: Decision,
    ) -> Result<(), LedgerError> {
        let id = sheet_id(reference);
        let row = [
            json!(email),
            json!(ping_count.to_string()),
            json!(decision.as_str()),
        ];
        match self.find_row(id, email).await? {
            Some(n) => {
                self.write(
                    reqwest::Method::PUT,
                    &format!("/v4/spreadsheets/{id}/values/Sheet1!A{n}:C{n}?valueInputOption=RAW"),
                    json!({ "values": [row] }),
                )
                .await
            }
            None => {
                self.write(
                    reqwest::Method::POST,
                    &format!(
                        "/v4/spreadsheets/{id}/values/Sheet1!A:C:append?valueInputOption=RAW"
                    ),
                    json!({ "values": [row] }),
                )
                .await
            }
        }
    }
}
