use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Permission tier gating page access
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SiteAdmin,
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::SiteAdmin, Self::Admin, Self::Teacher, Self::Student];

    /// Wire name, as sent by the backend and stored in the role cookie
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SiteAdmin => "site_admin",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    /// Dashboard route a user with this role lands on
    pub fn home_route(self) -> &'static str {
        match self {
            Self::SiteAdmin => "/site-admin",
            Self::Admin => "/admin",
            Self::Teacher => "/teacher",
            Self::Student => "/student",
        }
    }

    /// Login page for this role. Site admins share the admin login.
    pub fn login_route(self) -> &'static str {
        match self {
            Self::SiteAdmin | Self::Admin => "/login/admin",
            Self::Teacher => "/login/teacher",
            Self::Student => "/login/student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

/// Server-confirmed user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub school: Option<JsonValue>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Backend ids are integers for some tables and UUIDs for others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Access and refresh credential pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Where the client code is running.
///
/// Only a `Client` context owns persistent storage and can navigate; in a
/// `Server` context token reads return nothing and writes are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    #[default]
    Client,
    Server,
}

impl ExecutionContext {
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}
