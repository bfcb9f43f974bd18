//! # Admin Server REST Client
//!
//! Production [`RemoteApi`] implementation over reqwest.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request(method, path, body)                                            │
//! │       │                                                                 │
//! │       ├── attach Bearer access token                                    │
//! │       ├── send                                                          │
//! │       │                                                                 │
//! │       ├── 401? ──▶ POST /auth/refresh (once) ──▶ retry with new token   │
//! │       │                second 401: SyncError::AuthFailed                │
//! │       │                                                                 │
//! │       ├── connect/timeout errors ──▶ friendly transport errors          │
//! │       └── non-success status ──▶ friendly status message                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::RemoteApi;
use crate::auth::{TokenPair, TokenStore};
use crate::config::normalize_server_url;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use vela_core::EntityType;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Error Mapping
// =============================================================================

/// Converts a `reqwest::Error` into a friendly transport error.
fn friendly_error(url: &str, err: &reqwest::Error) -> SyncError {
    if err.is_connect() {
        return SyncError::Unreachable(url.to_string());
    }
    if err.is_timeout() {
        return SyncError::Timeout(url.to_string());
    }
    SyncError::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Converts an HTTP status code into a friendly message.
fn status_error(status: StatusCode) -> SyncError {
    let message = match status.as_u16() {
        401 => "Session expired; terminal must re-authenticate".to_string(),
        403 => "Terminal not authorized".to_string(),
        404 => "Admin server endpoint not found".to_string(),
        s if s >= 500 => format!("Admin server error (HTTP {s})"),
        s => format!("Unexpected response from admin server (HTTP {s})"),
    };
    SyncError::Status {
        status: status.as_u16(),
        message,
    }
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated REST client for the admin server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// Creates a new client for the given server URL.
    pub fn new(server_url: &str, tokens: TokenStore) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(ApiClient {
            http,
            base_url: normalize_server_url(server_url),
            tokens,
        })
    }

    /// The normalised base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one authenticated request, refreshing the token once on 401.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let url = format!("{}/api{path}", self.base_url);

        let mut refreshed = false;
        loop {
            let mut builder = self.http.request(method.clone(), &url);
            if let Some(token) = self.tokens.access_token().await {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| friendly_error(&url, &e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!(url = %url, "access token rejected, refreshing");
                self.refresh_tokens().await?;
                refreshed = true;
                continue;
            }

            if !status.is_success() {
                warn!(url = %url, status = status.as_u16(), "request failed");
                return Err(status_error(status));
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return response
                .json::<Value>()
                .await
                .map_err(|e| SyncError::BadResponse(e.to_string()));
        }
    }

    /// `POST /auth/refresh` - swaps the stored pair for a fresh one.
    async fn refresh_tokens(&self) -> SyncResult<()> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .await
            .ok_or_else(|| SyncError::AuthFailed("no refresh token stored".into()))?;

        let url = format!("{}/api/auth/refresh", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| friendly_error(&url, &e))?;

        if !response.status().is_success() {
            self.tokens.clear().await;
            return Err(SyncError::AuthFailed(format!(
                "refresh rejected (HTTP {})",
                response.status().as_u16()
            )));
        }

        let pair: TokenPair = response
            .json()
            .await
            .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
        self.tokens.set(pair).await;
        Ok(())
    }
}

/// Pulls the server-assigned id out of a create response
/// (`{"id": ..}` or `{"data": {"id": ..}}`).
fn extract_id(value: &Value) -> SyncResult<i64> {
    value
        .get("id")
        .or_else(|| value.get("data").and_then(|d| d.get("id")))
        .and_then(Value::as_i64)
        .ok_or_else(|| SyncError::BadResponse("response carries no id".into()))
}

/// Pulls the record array out of a list response
/// (bare array or `{"data": [..]}`).
fn extract_records(value: Value) -> SyncResult<Vec<Value>> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(SyncError::BadResponse("response carries no records".into())),
        },
        _ => Err(SyncError::BadResponse("response carries no records".into())),
    }
}

/// Reads the entity types a `/sync/check` response reports as changed.
/// The canonical shape is a map `{entityType: hasUpdates}`, optionally
/// wrapped in `{"data": ..}`; a bare array of names is also accepted.
fn changed_types(value: Value) -> Vec<String> {
    match value {
        Value::Object(mut map) => {
            if let Some(data) = map.remove("data") {
                return changed_types(data);
            }
            map.into_iter()
                .filter(|(_, has_updates)| has_updates.as_bool().unwrap_or(false))
                .map(|(name, _)| name)
                .collect()
        }
        Value::Array(names) => names
            .into_iter()
            .filter_map(|n| match n {
                Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// RemoteApi Implementation
// =============================================================================

impl RemoteApi for ApiClient {
    async fn create_order(&self, payload: &Value) -> SyncResult<i64> {
        let response = self.request(Method::POST, "/orders", Some(payload)).await?;
        extract_id(&response)
    }

    async fn update_order(&self, server_id: i64, payload: &Value) -> SyncResult<()> {
        self.request(Method::PUT, &format!("/orders/{server_id}"), Some(payload))
            .await?;
        Ok(())
    }

    async fn open_shift(&self, payload: &Value) -> SyncResult<i64> {
        let response = self
            .request(Method::POST, "/shifts/open", Some(payload))
            .await?;
        extract_id(&response)
    }

    async fn update_shift(&self, server_id: i64, payload: &Value) -> SyncResult<()> {
        self.request(Method::PUT, &format!("/shifts/{server_id}"), Some(payload))
            .await?;
        Ok(())
    }

    async fn close_shift(&self, server_id: i64, payload: &Value) -> SyncResult<()> {
        self.request(
            Method::POST,
            &format!("/shifts/{server_id}/close-with-inventory"),
            Some(payload),
        )
        .await?;
        Ok(())
    }

    async fn create_inventory_entry(&self, payload: &Value) -> SyncResult<i64> {
        let response = self
            .request(Method::POST, "/inventory-entries", Some(payload))
            .await?;
        extract_id(&response)
    }

    async fn create_inventory_transaction(&self, payload: &Value) -> SyncResult<i64> {
        let response = self
            .request(Method::POST, "/inventory-transactions", Some(payload))
            .await?;
        extract_id(&response)
    }

    async fn create_table(&self, payload: &Value) -> SyncResult<i64> {
        let response = self.request(Method::POST, "/tables", Some(payload)).await?;
        extract_id(&response)
    }

    async fn update_table(&self, server_id: i64, payload: &Value) -> SyncResult<()> {
        self.request(Method::PUT, &format!("/tables/{server_id}"), Some(payload))
            .await?;
        Ok(())
    }

    async fn sync_check(&self, since: DateTime<Utc>, store_id: i64) -> SyncResult<Vec<String>> {
        // "Z" suffix rather than "+00:00": a bare '+' in a query string
        // decodes as a space
        let path = format!(
            "/sync/check?since={}&store_id={store_id}",
            since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
        let response = self.request(Method::GET, &path, None).await?;
        Ok(changed_types(response))
    }

    async fn sync_incremental(
        &self,
        entity_type: EntityType,
        since: DateTime<Utc>,
        store_id: i64,
    ) -> SyncResult<Vec<Value>> {
        let path = format!(
            "/sync/incremental?entity_type={}&since={}&store_id={store_id}",
            entity_type.as_str(),
            since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
        let response = self.request(Method::GET, &path, None).await?;
        extract_records(response)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_id_shapes() {
        assert_eq!(extract_id(&serde_json::json!({"id": 7})).unwrap(), 7);
        assert_eq!(
            extract_id(&serde_json::json!({"data": {"id": 9}})).unwrap(),
            9
        );
        assert!(extract_id(&serde_json::json!({"ok": true})).is_err());
    }

    #[test]
    fn test_extract_records_shapes() {
        let bare = serde_json::json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract_records(bare).unwrap().len(), 2);

        let wrapped = serde_json::json!({"data": [{"id": 1}]});
        assert_eq!(extract_records(wrapped).unwrap().len(), 1);

        assert!(extract_records(serde_json::json!("nope")).is_err());
    }

    #[test]
    fn test_changed_types_shapes() {
        let map = serde_json::json!({"products": true, "units": false, "recipes": true});
        let mut names = changed_types(map);
        names.sort();
        assert_eq!(names, vec!["products", "recipes"]);

        let wrapped = serde_json::json!({"data": {"settings": true}});
        assert_eq!(changed_types(wrapped), vec!["settings"]);

        let bare = serde_json::json!(["tables"]);
        assert_eq!(changed_types(bare), vec!["tables"]);
    }

    #[test]
    fn test_client_normalises_url() {
        let client = ApiClient::new("admin.example.com/api/", TokenStore::new()).unwrap();
        assert_eq!(client.base_url(), "https://admin.example.com");
    }
}
