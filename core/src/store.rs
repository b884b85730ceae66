use crate::error::StoreError;
use crate::types::{AuthTokens, User};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const TOKEN_TYPE_KEY: &str = "token_type";
const EXPIRES_IN_KEY: &str = "expires_in";
const USER_KEY: &str = "user";

const ALL_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_TYPE_KEY,
    EXPIRES_IN_KEY,
    USER_KEY,
];

/// String key-value storage that survives restarts.
///
/// Batch operations must apply all entries or none.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;
    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// Keeps every entry in one JSON document, rewritten on each batch.
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(%err, path = %path.display(), "discarding unreadable credential file");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// A store in a fresh directory under the system temp dir.
    pub fn temporary() -> Result<Self, StoreError> {
        let mut path = std::env::temp_dir();
        path.push(format!("bloghub-{}", Uuid::new_v4()));
        Self::open(path.join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized).map_err(|source| StoreError::Io {
            path: staging.display().to_string(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        let mut next = map.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), value.clone());
        }
        self.flush(&next)?;
        *map = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        let mut next = map.clone();
        for key in keys {
            next.remove(*key);
        }
        self.flush(&next)?;
        *map = next;
        Ok(())
    }
}

/// Durable record of the session credential and the cached user profile.
///
/// Reads are public. Writes are crate-private so that only the gateway's
/// refresh step and the session controller can change the credential.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(FileKeyValueStore::open(path)?)))
    }

    pub fn get(&self) -> Option<AuthTokens> {
        let access_token = self.backend.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.backend.get(REFRESH_TOKEN_KEY).unwrap_or_default();
        let token_type = self
            .backend
            .get(TOKEN_TYPE_KEY)
            .unwrap_or_else(|| "Bearer".to_string());
        let expires_in = self
            .backend
            .get(EXPIRES_IN_KEY)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        Some(AuthTokens {
            access_token,
            refresh_token,
            token_type,
            expires_in,
        })
    }

    pub fn get_user(&self) -> Option<User> {
        let raw = self.backend.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(%err, "cached user record is unreadable");
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.backend.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.backend
            .get(REFRESH_TOKEN_KEY)
            .filter(|token| !token.is_empty())
    }

    pub(crate) fn put(&self, tokens: &AuthTokens, user: &User) -> Result<(), StoreError> {
        let user = serde_json::to_string(user)?;
        self.backend.set_many(&[
            (ACCESS_TOKEN_KEY, tokens.access_token.clone()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.clone()),
            (TOKEN_TYPE_KEY, tokens.token_type.clone()),
            (EXPIRES_IN_KEY, tokens.expires_in.to_string()),
            (USER_KEY, user),
        ])
    }

    pub(crate) fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let user = serde_json::to_string(user)?;
        self.backend.set_many(&[(USER_KEY, user)])
    }

    pub(crate) fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&ALL_KEYS)
    }
}
