//! Access-token refresh

use crate::client::error::ClientError;
use crate::events::{AuthEvent, AuthEvents};
use crate::store::TokenStore;
use crate::types::{RefreshRequest, RefreshResponse};
use reqwest::Client;

/// Path of the refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Exchanges the stored refresh token for a new access token.
///
/// Each call makes at most one request and never retries. Any failure wipes
/// the stored pair so later requests go out unauthenticated.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    http: Client,
    url: String,
    store: TokenStore,
    events: AuthEvents,
}

impl TokenRefresher {
    pub fn new(http: Client, base_url: &str, store: TokenStore, events: AuthEvents) -> Self {
        Self {
            http,
            url: format!("{base_url}{REFRESH_PATH}"),
            store,
            events,
        }
    }

    /// New access token, or `None` when there was nothing to refresh or the refresh failed
    pub async fn refresh_access_token(&self) -> Option<String> {
        let Some(refresh) = self.store.refresh_token() else {
            tracing::debug!("No refresh token stored, skipping refresh");
            return None;
        };

        let response = match self.exchange(&refresh).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Token refresh failed: {e}");
                self.discard_tokens();
                return None;
            }
        };

        let rotated = response
            .refresh
            .as_deref()
            .filter(|rotated| !rotated.is_empty())
            .unwrap_or(&refresh);
        if let Err(e) = self.store.set_tokens(&response.access, rotated) {
            tracing::warn!("Could not persist refreshed tokens: {e}");
            self.discard_tokens();
            return None;
        }

        tracing::debug!(rotated = rotated != refresh, "Access token refreshed");
        self.events.emit(AuthEvent::TokensRefreshed);
        Some(response.access)
    }

    async fn exchange(&self, refresh: &str) -> Result<RefreshResponse, ClientError> {
        let response = self
            .http
            .post(&self.url)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn discard_tokens(&self) {
        if let Err(e) = self.store.clear_tokens() {
            tracing::warn!("Failed to clear tokens after refresh failure: {e}");
        }
        self.events.emit(AuthEvent::TokensCleared);
    }
}
