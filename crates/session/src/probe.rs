//! What the session guard needs from the backend

use async_trait::async_trait;
use sms_http::types::{HealthStatus, SessionValidation};
use sms_http::{ApiClient, ClientError};

/// Session checks used by a mounted page
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Whether credentials are stored locally. Must not touch the network.
    fn has_local_session(&self) -> bool;

    async fn validate_session(&self) -> Result<SessionValidation, ClientError>;

    async fn check_health(&self) -> HealthStatus;

    /// Drop stored credentials after the backend refused the session
    fn clear_tokens(&self);
}

#[async_trait]
impl SessionProbe for ApiClient {
    fn has_local_session(&self) -> bool {
        self.store().access_token().is_some()
    }

    async fn validate_session(&self) -> Result<SessionValidation, ClientError> {
        ApiClient::validate_session(self).await
    }

    async fn check_health(&self) -> HealthStatus {
        ApiClient::check_health(self).await
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.store().clear_tokens() {
            tracing::warn!("Failed to clear tokens: {e}");
        }
        self.events().emit(sms_http::AuthEvent::TokensCleared);
    }
}
