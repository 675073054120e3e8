//! Persistence for the signed-in session: `{access, refresh, user}`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access: String,
    pub refresh: String,
    /// The user object returned at sign-in, kept opaque.
    #[serde(default)]
    pub user: serde_json::Value,
}

pub trait TokenStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ClientError`] if the backing storage cannot be read or parsed.
    fn load(&self) -> Result<Option<StoredTokens>, ClientError>;

    /// # Errors
    ///
    /// Returns [`ClientError`] if the backing storage cannot be written.
    fn save(&self, tokens: &StoredTokens) -> Result<(), ClientError>;

    /// # Errors
    ///
    /// Returns [`ClientError`] if the backing storage cannot be cleared.
    fn clear(&self) -> Result<(), ClientError>;
}

/// JSON token file on disk. A missing file means signed out.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ClientError {
        ClientError::TokenFile {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, ClientError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ClientError::Deserialize {
                context: self.path.display().to_string(),
                source,
            })
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(tokens).map_err(|source| {
            ClientError::Deserialize {
                context: "token serialization".to_string(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process store for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, ClientError> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), ClientError> {
        *self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredTokens {
        StoredTokens {
            access: "a".to_string(),
            refresh: "r".to_string(),
            user: serde_json::json!({"id": 1, "username": "jane"}),
        }
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = std::env::temp_dir().join(format!("bazaar-tokens-{}", rand::random::<u64>()));
        let store = FileTokenStore::new(dir.join("session.json"));

        assert_eq!(store.load().expect("load"), None);
        store.save(&sample()).expect("save");
        assert_eq!(store.load().expect("load"), Some(sample()));
        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
        store.clear().expect("clear twice");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_file_is_a_deserialize_error() {
        let path = std::env::temp_dir().join(format!("bazaar-bad-{}.json", rand::random::<u64>()));
        std::fs::write(&path, "{not json").expect("write");
        let store = FileTokenStore::new(&path);
        assert!(matches!(store.load(), Err(ClientError::Deserialize { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn memory_store_starts_empty() {
        let store = MemoryTokenStore::default();
        assert_eq!(store.load().expect("load"), None);
        store.save(&sample()).expect("save");
        assert_eq!(store.load().expect("load").map(|t| t.access), Some("a".into()));
    }
}
