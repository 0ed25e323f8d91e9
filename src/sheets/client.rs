// ABOUTME: HTTP client for the Google Sheets values API
// ABOUTME: Reads, clears, and overwrites one A1 range of one spreadsheet

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

use super::models::{UpdateValuesResponse, ValueRange};
use super::Spreadsheet;
use crate::error::SyncError;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4/";

pub struct SheetsClient {
    client: Client,
    api_base: Url,
    spreadsheet_id: String,
    range: String,
    access_token: Option<String>,
}

impl SheetsClient {
    pub fn new(
        api_base: &str,
        spreadsheet_id: String,
        range: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut api_base =
            Url::parse(api_base).with_context(|| format!("Invalid Sheets API URL: {}", api_base))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Ok(Self {
            client,
            api_base,
            spreadsheet_id,
            range,
            access_token,
        })
    }

    pub fn range(&self) -> &str {
        &self.range
    }

    /// `{base}spreadsheets/{id}/values/{range}{suffix}`, percent-encoded.
    fn values_url(&self, suffix: &str) -> Result<Url, SyncError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::sheet_unavailable("Sheets API URL cannot be a base"))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", self.range, suffix));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.access_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(&self, response: Response, action: &str) -> Result<Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, action, &body))
    }
}

/// Classify a failed response. Client errors other than timeouts and rate
/// limits are permanent; everything else is worth retrying.
fn status_error(status: StatusCode, action: &str, body: &str) -> SyncError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return SyncError::sheet_rejected(format!(
            "{} was refused ({}). The access token may be invalid, expired, or lack the \
             spreadsheets scope",
            action, status
        ));
    }

    let message = format!("{} failed with status {}: {}", action, status, body);
    let retryable = status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || !status.is_client_error();
    if retryable {
        SyncError::sheet_unavailable(message)
    } else {
        SyncError::sheet_rejected(message)
    }
}

#[async_trait]
impl Spreadsheet for SheetsClient {
    async fn read_range(&self) -> Result<Vec<Vec<String>>, SyncError> {
        let url = self.values_url("")?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let response = self.check(response, "Reading sheet range").await?;

        let range: ValueRange = response.json().await.map_err(|e| {
            SyncError::sheet_unavailable(format!("Failed to parse sheet values: {}", e))
        })?;
        let cells = range.into_cells();
        tracing::debug!("Read {} rows from {}", cells.len(), self.range);
        Ok(cells)
    }

    async fn clear_range(&self) -> Result<(), SyncError> {
        let url = self.values_url(":clear")?;
        let response = self
            .authorize(self.client.post(url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        self.check(response, "Clearing sheet range").await?;
        tracing::debug!("Cleared {}", self.range);
        Ok(())
    }

    async fn write_range(&self, rows: &[Vec<String>]) -> Result<(), SyncError> {
        let mut url = self.values_url("")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRange::rows(&self.range, rows);
        let response = self
            .authorize(self.client.put(url))
            .json(&body)
            .send()
            .await?;
        let response = self.check(response, "Writing sheet range").await?;

        match response.json::<UpdateValuesResponse>().await {
            Ok(update) => tracing::debug!(
                "Wrote {} rows ({} cells) to {}",
                update.updated_rows.unwrap_or(0),
                update.updated_cells.unwrap_or(0),
                update.updated_range.as_deref().unwrap_or(&self.range)
            ),
            Err(e) => tracing::debug!("Sheet write succeeded, response not parsed: {}", e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> SheetsClient {
        SheetsClient::new(
            base,
            "abc123".to_string(),
            "Sheet1!A2:D".to_string(),
            Some("token".to_string()),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_client_creation() {
        assert!(SheetsClient::new(
            DEFAULT_API_BASE,
            "id".to_string(),
            "A:D".to_string(),
            None,
            Duration::from_secs(5)
        )
        .is_ok());
        assert!(SheetsClient::new(
            "not a url",
            "id".to_string(),
            "A:D".to_string(),
            None,
            Duration::from_secs(5)
        )
        .is_err());
    }

    #[test]
    fn test_values_url() {
        let url = client(DEFAULT_API_BASE).values_url("").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/Sheet1!A2:D"
        );
    }

    #[test]
    fn test_values_url_clear_suffix_and_base_without_slash() {
        let url = client("http://127.0.0.1:8080/v4").values_url(":clear").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/v4/spreadsheets/abc123/values/Sheet1!A2:D:clear"
        );
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
        ] {
            let err = status_error(status, "Reading sheet range", "");
            assert!(
                matches!(err, SyncError::RequestRejected { .. }),
                "{} should be rejected, got {:?}",
                status,
                err
            );
        }
    }

    #[test]
    fn test_timeouts_rate_limits_and_server_errors_are_retried() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(status_error(status, "Writing sheet range", "").is_transient());
        }
    }

    #[test]
    fn test_values_url_encodes_spaces() {
        let client = SheetsClient::new(
            DEFAULT_API_BASE,
            "abc123".to_string(),
            "My Sheet!A2:D".to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.values_url("").unwrap();
        assert!(url.as_str().ends_with("/values/My%20Sheet!A2:D"));
    }
}
