//! Token persistence
//!
//! Tokens live in two places at once: a key-value storage the client reads
//! before every request, and a cookie mirror that server-side page handling
//! reads before the client has started. [`TokenStore`] writes both together.

use cookie::{Cookie, SameSite};
use sms_core::{ExecutionContext, Role, TokenPair};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use time::Duration;

/// Storage key and cookie name of the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key and cookie name of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Cookie carrying the confirmed role
pub const USER_ROLE_COOKIE: &str = "user_role";

pub const ACCESS_COOKIE_MAX_AGE: Duration = Duration::hours(1);
pub const REFRESH_COOKIE_MAX_AGE: Duration = Duration::days(7);

/// Storage backend failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Persistent string storage, shaped like a browser's local storage
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Cookie mirror readable by server-side request handling.
///
/// A cookie written with a zero max-age is a deletion.
pub trait CookieJar: Send + Sync {
    fn set_cookie(&self, cookie: Cookie<'static>) -> Result<(), StorageError>;
    fn get_cookie(&self, name: &str) -> Option<Cookie<'static>>;
}

/// In-process storage and cookie jar
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    cookies: Mutex<HashMap<String, Cookie<'static>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

impl CookieJar for MemoryStorage {
    fn set_cookie(&self, cookie: Cookie<'static>) -> Result<(), StorageError> {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if cookie.max_age() == Some(Duration::ZERO) {
            cookies.remove(cookie.name());
        } else {
            cookies.insert(cookie.name().to_string(), cookie);
        }
        Ok(())
    }

    fn get_cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.get(name).cloned()
    }
}

fn mirror_cookie(name: &'static str, value: &str, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Owner of the access/refresh token pair
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    cookies: Arc<dyn CookieJar>,
    context: ExecutionContext,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        cookies: Arc<dyn CookieJar>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            storage,
            cookies,
            context,
        }
    }

    /// Store backed by a fresh [`MemoryStorage`] for both storage and cookies
    pub fn in_memory(context: ExecutionContext) -> Self {
        let memory = Arc::new(MemoryStorage::new());
        Self::new(memory.clone(), memory, context)
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Persist both tokens and mirror them into cookies.
    ///
    /// A partial write is rolled back so storage and cookies never disagree.
    ///
    /// # Errors
    ///
    /// Returns the first storage or cookie write failure
    pub fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StorageError> {
        if !self.context.is_client() {
            return Ok(());
        }

        if let Err(e) = self.write_tokens(access, refresh) {
            tracing::warn!("Storing tokens failed, rolling back: {e}");
            if let Err(rollback) = self.clear_tokens() {
                tracing::warn!("Token rollback incomplete: {rollback}");
            }
            return Err(e);
        }
        tracing::debug!("Stored new token pair");
        Ok(())
    }

    fn write_tokens(&self, access: &str, refresh: &str) -> Result<(), StorageError> {
        self.storage.set_item(ACCESS_TOKEN_KEY, access)?;
        self.storage.set_item(REFRESH_TOKEN_KEY, refresh)?;
        self.cookies
            .set_cookie(mirror_cookie(ACCESS_TOKEN_KEY, access, ACCESS_COOKIE_MAX_AGE))?;
        self.cookies.set_cookie(mirror_cookie(
            REFRESH_TOKEN_KEY,
            refresh,
            REFRESH_COOKIE_MAX_AGE,
        ))
    }

    /// Record the confirmed role for server-side page gating
    ///
    /// # Errors
    ///
    /// Returns the cookie write failure
    pub fn set_user_role(&self, role: Role) -> Result<(), StorageError> {
        if !self.context.is_client() {
            return Ok(());
        }
        self.cookies.set_cookie(mirror_cookie(
            USER_ROLE_COOKIE,
            role.as_str(),
            REFRESH_COOKIE_MAX_AGE,
        ))
    }

    pub fn access_token(&self) -> Option<String> {
        if !self.context.is_client() {
            return None;
        }
        self.storage
            .get_item(ACCESS_TOKEN_KEY)
            .filter(|token| !token.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        if !self.context.is_client() {
            return None;
        }
        self.storage
            .get_item(REFRESH_TOKEN_KEY)
            .filter(|token| !token.is_empty())
    }

    /// Both tokens, when both are stored
    pub fn tokens(&self) -> Option<TokenPair> {
        Some(TokenPair::new(self.access_token()?, self.refresh_token()?))
    }

    /// Role recorded in the cookie mirror
    pub fn user_role(&self) -> Option<Role> {
        if !self.context.is_client() {
            return None;
        }
        self.cookies
            .get_cookie(USER_ROLE_COOKIE)
            .and_then(|cookie| cookie.value().parse().ok())
    }

    /// Remove both tokens and expire every auth cookie. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Every step is attempted; the first failure is returned
    pub fn clear_tokens(&self) -> Result<(), StorageError> {
        if !self.context.is_client() {
            return Ok(());
        }

        let results = [
            self.storage.remove_item(ACCESS_TOKEN_KEY),
            self.storage.remove_item(REFRESH_TOKEN_KEY),
            self.cookies.set_cookie(expired_cookie(ACCESS_TOKEN_KEY)),
            self.cookies.set_cookie(expired_cookie(REFRESH_TOKEN_KEY)),
            self.cookies.set_cookie(expired_cookie(USER_ROLE_COOKIE)),
        ];
        tracing::debug!("Cleared stored tokens");
        results.into_iter().collect()
    }
}
