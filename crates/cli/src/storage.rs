//! File-backed token storage
//!
//! Keeps storage items and the cookie mirror in one JSON file so tokens
//! survive between CLI invocations.

use cookie::Cookie;
use serde::{Deserialize, Serialize};
use sms_http::{CookieJar, KeyValueStorage, StorageError};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use time::{Duration, OffsetDateTime};

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    items: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, StoredCookie>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    /// Unix timestamp after which the cookie is gone
    expires_at: Option<i64>,
}

impl StoredCookie {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now.unix_timestamp())
    }
}

/// Storage items and cookies persisted to `session.json`
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<SessionFile>,
}

impl FileStorage {
    /// Open the session file in `dir`, starting empty if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(SESSION_FILE);
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionFile::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "Opened session file");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and persist; memory only changes once the file is written
    fn update(&self, f: impl FnOnce(&mut SessionFile)) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = state.clone();
        f(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    fn persist(&self, state: &SessionFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|state| {
            state.items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.update(|state| {
            state.items.remove(key);
        })
    }
}

impl CookieJar for FileStorage {
    fn set_cookie(&self, cookie: Cookie<'static>) -> Result<(), StorageError> {
        let now = OffsetDateTime::now_utc();
        self.update(|state| match cookie.max_age() {
            Some(max_age) if max_age <= Duration::ZERO => {
                state.cookies.remove(cookie.name());
            }
            max_age => {
                state.cookies.insert(
                    cookie.name().to_string(),
                    StoredCookie {
                        value: cookie.value().to_string(),
                        expires_at: max_age.map(|age| (now + age).unix_timestamp()),
                    },
                );
            }
        })
    }

    fn get_cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let now = OffsetDateTime::now_utc();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = state.cookies.get(name).filter(|c| !c.is_expired(now))?;

        let mut cookie = Cookie::build((name.to_string(), stored.value.clone())).path("/");
        if let Some(at) = stored.expires_at {
            cookie = cookie.max_age(Duration::seconds(at - now.unix_timestamp()));
        }
        Some(cookie.build())
    }
}
