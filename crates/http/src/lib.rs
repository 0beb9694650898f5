//! Authenticated HTTP client for the school management backend
//!
//! The crate is split along the token lifecycle: [`store`] persists the token
//! pair, [`token`] reads expiry claims offline, [`refresh`] exchanges refresh
//! tokens, and [`client`] wraps REST calls around all three.

pub mod client;
pub mod events;
pub mod refresh;
pub mod store;
pub mod token;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, ApiError, ClientError, Query, QueryValue};
pub use events::{AuthEvent, AuthEvents};
pub use refresh::TokenRefresher;
pub use store::{CookieJar, KeyValueStorage, MemoryStorage, StorageError, TokenStore};

pub use reqwest::Method;
