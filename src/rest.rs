//! PostgREST client for the singleton row.
//!
//! Thin HTTP wrapper over `/rest/v1/<table>`. Pure parsing lives in
//! `parse_row`, `parse_rows` and `parse_error` for testability.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::state::ToggleState;
use crate::store::ToggleStore;

/// Accept header that makes PostgREST return one object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST code for "zero (or many) rows where exactly one was expected".
pub const NO_ROWS_CODE: &str = "PGRST116";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    table_url: String,
    row_id: i64,
}

impl RestClient {
    /// Build a client with `apikey` / bearer headers baked in.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.anon_key).map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;

        Ok(Self { http, table_url: config.rest_url(), row_id: config.row_id })
    }

    fn row_filter_url(&self) -> String {
        format!("{}?id=eq.{}", self.table_url, self.row_id)
    }

    /// `GET ?select=*&id=eq.<id>` with single-object semantics.
    ///
    /// # Errors
    ///
    /// Returns `PGRST116` when the row does not exist, or any transport /
    /// decode failure.
    pub async fn fetch_row(&self) -> Result<ToggleState, BackendError> {
        let url = format!("{}&select=*", self.row_filter_url());
        debug!(%url, "fetching lightbulb row");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let text = read_success_body(response).await?;
        parse_row(&text)
    }

    /// `PATCH ?id=eq.<id>` with `Prefer: return=representation`.
    ///
    /// # Errors
    ///
    /// Returns `PGRST116` when no row matched the filter, or any transport /
    /// decode failure.
    pub async fn update_row(&self, value: bool) -> Result<ToggleState, BackendError> {
        let url = self.row_filter_url();
        debug!(%url, value, "updating lightbulb row");

        let response = self
            .http
            .patch(&url)
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "is_on": value }))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let text = read_success_body(response).await?;
        parse_rows(&text)?.into_iter().next().ok_or_else(|| BackendError::Postgrest {
            status: 200,
            code: NO_ROWS_CODE.to_owned(),
            message: format!("no row with id {} was updated", self.row_id),
            details: None,
            hint: None,
        })
    }
}

#[async_trait::async_trait]
impl ToggleStore for RestClient {
    async fn fetch(&self) -> Result<ToggleState, BackendError> {
        self.fetch_row().await
    }

    async fn write(&self, value: bool) -> Result<ToggleState, BackendError> {
        self.update_row(value).await
    }
}

async fn read_success_body(response: reqwest::Response) -> Result<String, BackendError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(parse_error(status, &text));
    }
    Ok(text)
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_row(json: &str) -> Result<ToggleState, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Decode(e.to_string()))
}

fn parse_rows(json: &str) -> Result<Vec<ToggleState>, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Decode a non-success body. Bodies that are not PostgREST errors keep the
/// status and raw text.
fn parse_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<PostgrestErrorBody>(body) {
        Ok(PostgrestErrorBody { code: Some(code), message, details, hint }) => BackendError::Postgrest {
            status,
            code,
            message: message.unwrap_or_default(),
            details,
            hint,
        },
        _ => BackendError::Http { status, body: body.trim().to_owned() },
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
