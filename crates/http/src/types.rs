//! Request and response bodies exchanged with the backend

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sms_core::User;

/// Token refresh request
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Token refresh response; the backend may or may not rotate the refresh token
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Login request
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Login response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
    #[serde(default)]
    pub teacher: Option<JsonValue>,
    #[serde(default)]
    pub admin: Option<JsonValue>,
}

/// Logout request
#[derive(Debug, Serialize)]
pub struct LogoutRequest<'a> {
    pub refresh: Option<&'a str>,
}

/// Current user profile
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserResponse {
    pub user: User,
    #[serde(default)]
    pub teacher: Option<JsonValue>,
    #[serde(default)]
    pub admin: Option<JsonValue>,
}

/// Result of asking the backend whether the stored session is still good
#[derive(Debug, Clone, PartialEq)]
pub struct SessionValidation {
    pub valid: bool,
    pub user: Option<User>,
}

impl SessionValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            user: None,
        }
    }
}

/// Backend reachability and local credential state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    /// The health endpoint answered with a success status
    pub api: bool,
    /// An unexpired access token is stored
    pub auth: bool,
}

/// Paginated list envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// List endpoints answer either with a bare array or a paginated envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Plain(Vec<T>),
    Paged(Paginated<T>),
}

impl<T> ListResponse<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Plain(items) => items,
            Self::Paged(page) => page.results,
        }
    }
}

/// Body returned by endpoints that only acknowledge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Teacher profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teacher {
    pub id: JsonValue,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Core or elective subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: JsonValue,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Class (grade level)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: JsonValue,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Section within a class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: JsonValue,
    pub name: String,
    #[serde(default)]
    pub class_id: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Academic session (school year)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicSession {
    pub id: JsonValue,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}
