//! # Token Store
//!
//! Holds the terminal's access/refresh token pair behind a `RwLock`.
//!
//! The HTTP client reads the access token per request and swaps in the new
//! pair after a `POST /auth/refresh`. At most one refresh is attempted per
//! failed request; repeated failure is surfaced on the event bus as
//! `SyncEvent::AuthFailure`, never thrown across the sync boundary.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// An access/refresh token pair issued by the admin server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Shared, mutable token storage.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<TokenPair>>>,
}

impl TokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        TokenStore::default()
    }

    /// Creates a store pre-loaded with a pair.
    pub fn with_tokens(pair: TokenPair) -> Self {
        TokenStore {
            inner: Arc::new(RwLock::new(Some(pair))),
        }
    }

    /// The current access token, if authenticated.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|p| p.access_token.clone())
    }

    /// The current refresh token, if authenticated.
    pub async fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|p| p.refresh_token.clone())
    }

    /// Replaces the stored pair after a successful refresh or login.
    pub async fn set(&self, pair: TokenPair) {
        *self.inner.write().await = Some(pair);
    }

    /// Drops the stored pair (logout, or refresh permanently rejected).
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_read_clear() {
        let store = TokenStore::new();
        assert_eq!(store.access_token().await, None);

        store
            .set(TokenPair {
                access_token: "acc-1".into(),
                refresh_token: "ref-1".into(),
            })
            .await;
        assert_eq!(store.access_token().await.as_deref(), Some("acc-1"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("ref-1"));

        store.clear().await;
        assert_eq!(store.access_token().await, None);
    }
}
