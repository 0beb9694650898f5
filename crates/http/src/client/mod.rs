//! Authenticated API client
//!
//! Every request goes through the same steps: read the stored access token,
//! refresh it once if it has expired, attach it as a bearer header, send, and
//! normalize the response. A 401 wipes the stored tokens and publishes
//! [`AuthEvent::Unauthenticated`]; navigation is left to subscribers.

pub mod auth;
pub mod error;
pub mod query;
pub mod resources;

pub use error::{ApiError, ClientError};
pub use query::{Query, QueryValue};

use crate::events::{AuthEvent, AuthEvents};
use crate::refresh::TokenRefresher;
use crate::store::TokenStore;
use crate::token;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sms_core::ClientConfig;
use std::time::Duration;
use tokio::sync::broadcast;

/// School management API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: TokenStore,
    refresher: TokenRefresher,
    events: AuthEvents,
}

impl ApiClient {
    /// Create a new client with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, store: TokenStore) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).store(store).build()
    }

    /// Create a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_config(config: &ClientConfig, store: TokenStore) -> Result<Self, ClientError> {
        Self::builder()
            .base_url(config.api.base_url.clone())
            .timeout(config.api.timeout())
            .user_agent(config.api.user_agent.clone())
            .store(store)
            .build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    /// Subscribe to authentication events raised by this client
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn url(&self, path: &str, query: Option<&Query>) -> String {
        let query = query.map(Query::to_query_string).unwrap_or_default();
        format!("{}{}{}", self.base_url, path, query)
    }

    /// Access token to send, refreshing it first if it has expired
    async fn bearer_token(&self) -> Option<String> {
        match self.store.access_token() {
            Some(token) if token::is_expired(&token) => {
                tracing::debug!("Access token expired, refreshing before request");
                self.refresher.refresh_access_token().await
            }
            token => token,
        }
    }

    /// Create a request builder carrying the bearer header when a token is available
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
    ) -> RequestBuilder {
        let mut request = self.http.request(method, self.url(path, query));
        if let Some(token) = self.bearer_token().await {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Create a JSON request builder
    async fn json_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
        body: Option<&B>,
    ) -> Result<RequestBuilder, ClientError> {
        let mut request = self
            .request(method, path, query)
            .await
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }
        Ok(request)
    }

    /// Execute a request and handle common errors
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] on 401 (after clearing stored tokens),
    /// [`ClientError::Api`] on other failure statuses, and transport or decoding errors
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if !status.is_success() {
            let url = response.url().path().to_string();
            let body = response.bytes().await.unwrap_or_default();
            let error = ClientError::from_status(status, &body);
            if status == StatusCode::UNAUTHORIZED {
                tracing::info!(path = %url, "Request rejected as unauthenticated, clearing tokens");
                self.discard_session(status);
            } else {
                tracing::debug!(path = %url, status = status.as_u16(), "Request failed: {error}");
            }
            return Err(error);
        }

        if status == StatusCode::NO_CONTENT {
            return no_content();
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn discard_session(&self, status: StatusCode) {
        if let Err(e) = self.store.clear_tokens() {
            tracing::warn!("Failed to clear tokens: {e}");
        }
        self.events.emit(AuthEvent::Unauthenticated {
            status_code: status.as_u16(),
        });
    }

    /// Send a JSON request with optional query parameters and body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn send<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.json_request(method, path, query, body).await?;
        self.execute(request).await
    }

    /// GET a resource
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&Query>,
    ) -> Result<T, ClientError> {
        self.send::<T, ()>(Method::GET, path, query, None).await
    }

    /// POST a JSON body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn post<T, B>(
        &self,
        path: &str,
        query: Option<&Query>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, path, query, body).await
    }

    /// PUT a JSON body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn put<T, B>(
        &self,
        path: &str,
        query: Option<&Query>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PUT, path, query, body).await
    }

    /// PATCH a JSON body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn patch<T, B>(
        &self,
        path: &str,
        query: Option<&Query>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PATCH, path, query, body).await
    }

    /// DELETE a resource
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send::<T, ()>(Method::DELETE, path, None, None).await
    }

    /// POST a multipart form. The transport sets the content type and boundary.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ClientError> {
        let request = self.request(Method::POST, path, None).await.multipart(form);
        self.execute(request).await
    }

    /// PATCH a multipart form. The transport sets the content type and boundary.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn patch_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ClientError> {
        let request = self.request(Method::PATCH, path, None).await.multipart(form);
        self.execute(request).await
    }
}

/// Empty result for a 204: `{}` for map-like targets, unit otherwise
fn no_content<T: DeserializeOwned>() -> Result<T, ClientError> {
    let empty = serde_json::Value::Object(serde_json::Map::new());
    serde_json::from_value(empty)
        .or_else(|_| serde_json::from_value(serde_json::Value::Null))
        .map_err(ClientError::from)
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    store: Option<TokenStore>,
    events: Option<AuthEvents>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the token store
    pub fn store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing event channel instead of creating one
    pub fn events(mut self, events: AuthEvents) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL or store was given, or the HTTP client cannot be built
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| ClientError::Configuration("token store is required".into()))?;

        // Paths start with a slash, so the base must not end with one
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| concat!("sms-client/", env!("CARGO_PKG_VERSION")).to_string()),
        );

        let http = client_builder.build()?;
        let events = self.events.unwrap_or_default();
        let refresher = TokenRefresher::new(http.clone(), &base_url, store.clone(), events.clone());

        Ok(ApiClient {
            http,
            base_url,
            store,
            refresher,
            events,
        })
    }
}
