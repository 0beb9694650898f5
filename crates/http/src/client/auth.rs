//! Authentication API client methods

use super::error::{ApiError, ClientError, ErrorBody};
use super::ApiClient;
use crate::events::AuthEvent;
use crate::token;
use crate::types::{
    CurrentUserResponse, HealthStatus, LoginRequest, LoginResponse, LogoutRequest,
    SessionValidation,
};
use reqwest::Method;

pub const LOGIN_PATH: &str = "/auth/login/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const CURRENT_USER_PATH: &str = "/auth/me/";
pub const HEALTH_PATH: &str = "/health/";

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

impl ApiClient {
    /// Log in with email and password, storing the issued tokens and role
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] with the backend's reason when the credentials are rejected
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        // Sent without a bearer header; a stale session must not interfere with login
        let response = self
            .http
            .post(format!("{}{LOGIN_PATH}", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let parsed = serde_json::from_slice::<ErrorBody>(&body).unwrap_or_default();
            let message = parsed
                .detail()
                .or_else(|| parsed.first_non_field_error())
                .unwrap_or(INVALID_CREDENTIALS)
                .to_string();
            tracing::info!(status = status.as_u16(), "Login rejected");
            return Err(ClientError::Api(ApiError::new(status.as_u16(), message)));
        }

        let body = response.bytes().await?;
        let login: LoginResponse = serde_json::from_slice(&body)?;
        self.store.set_tokens(&login.access, &login.refresh)?;
        self.store.set_user_role(login.user.role)?;
        tracing::info!(user_id = %login.user.id, role = %login.user.role, "Logged in");
        Ok(login)
    }

    /// Tell the backend to revoke the refresh token, then clear local tokens.
    ///
    /// Backend failures are logged and ignored; local tokens are always cleared.
    ///
    /// # Errors
    ///
    /// Returns an error only if local storage cannot be cleared
    pub async fn logout(&self) -> Result<(), ClientError> {
        let refresh = self.store.refresh_token();
        let result = self
            .send::<serde_json::Value, _>(
                Method::POST,
                LOGOUT_PATH,
                None,
                Some(&LogoutRequest {
                    refresh: refresh.as_deref(),
                }),
            )
            .await;
        if let Err(e) = result {
            tracing::debug!("Ignoring logout failure: {e}");
        }

        self.store.clear_tokens()?;
        self.events.emit(AuthEvent::TokensCleared);
        tracing::info!("Logged out");
        Ok(())
    }

    /// Get the profile of the logged-in user
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn current_user(&self) -> Result<CurrentUserResponse, ClientError> {
        self.get(CURRENT_USER_PATH, None).await
    }

    /// Ask the backend whether the stored session is still accepted.
    ///
    /// A missing session or a 401/403 answer is an invalid session, not an error.
    ///
    /// # Errors
    ///
    /// Returns transport failures and unexpected statuses so callers can offer a retry
    pub async fn validate_session(&self) -> Result<SessionValidation, ClientError> {
        if self.store.access_token().is_none() && self.store.refresh_token().is_none() {
            return Ok(SessionValidation::invalid());
        }

        match self.current_user().await {
            Ok(profile) => Ok(SessionValidation {
                valid: true,
                user: Some(profile.user),
            }),
            Err(ClientError::Unauthenticated(_)) => Ok(SessionValidation::invalid()),
            Err(ClientError::Api(e)) if e.status_code == 403 => Ok(SessionValidation::invalid()),
            Err(e) => Err(e),
        }
    }

    /// Probe backend reachability and check the local access token.
    ///
    /// Never fails: an unreachable backend is reported as `api: false`.
    pub async fn check_health(&self) -> HealthStatus {
        let api = match self
            .http
            .get(format!("{}{HEALTH_PATH}", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health probe failed: {e}");
                false
            }
        };

        let auth = self
            .store
            .access_token()
            .is_some_and(|token| !token::is_expired(&token));

        HealthStatus { api, auth }
    }
}
