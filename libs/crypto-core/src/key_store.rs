use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, CryptoResult};

/// Persisted key material for one identity
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeys {
    pub user_id: String,
    pub public_key: String,
    pub private_key: String,
    /// Set once the public half has been accepted by the server
    #[serde(default)]
    pub published: bool,
}

impl std::fmt::Debug for StoredKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeys")
            .field("user_id", &self.user_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("published", &self.published)
            .finish()
    }
}

/// Local storage for an identity's keypair
///
/// Implementations only need last-writer-wins semantics; a single client
/// process owns the entry for its identity.
pub trait KeyStore: Send + Sync {
    fn load(&self, user_id: &str) -> CryptoResult<Option<StoredKeys>>;
    fn save(&self, keys: &StoredKeys) -> CryptoResult<()>;
}

#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, StoredKeys>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, user_id: &str) -> CryptoResult<Option<StoredKeys>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CryptoError::Store("memory key store poisoned".into()))?;
        Ok(entries.get(user_id).cloned())
    }

    fn save(&self, keys: &StoredKeys) -> CryptoResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CryptoError::Store("memory key store poisoned".into()))?;
        entries.insert(keys.user_id.clone(), keys.clone());
        Ok(())
    }
}

/// One JSON file per identity under a directory: `{user_id}.keys.json`
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> CryptoResult<PathBuf> {
        if user_id.is_empty()
            || !user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CryptoError::Store(format!(
                "identity id not usable as a file name: {user_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{user_id}.keys.json")))
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self, user_id: &str) -> CryptoResult<Option<StoredKeys>> {
        let path = self.path_for(user_id)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => zeroize::Zeroizing::new(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptoError::Store(format!("{}: {e}", path.display()))),
        };

        let keys: StoredKeys = serde_json::from_slice(&raw)
            .map_err(|e| CryptoError::Store(format!("{}: {e}", path.display())))?;
        if keys.user_id != user_id {
            return Err(CryptoError::Store(format!(
                "{} holds keys for a different identity",
                path.display()
            )));
        }
        Ok(Some(keys))
    }

    fn save(&self, keys: &StoredKeys) -> CryptoResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CryptoError::Store(format!("{}: {e}", self.dir.display())))?;
        let path = self.path_for(&keys.user_id)?;

        let body = zeroize::Zeroizing::new(
            serde_json::to_vec_pretty(keys).map_err(|e| CryptoError::Store(e.to_string()))?,
        );
        std::fs::write(&path, body.as_slice())
            .map_err(|e| CryptoError::Store(format!("{}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| CryptoError::Store(format!("{}: {e}", path.display())))?;
        }

        debug!(path = %path.display(), "identity keys written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: &str) -> StoredKeys {
        StoredKeys {
            user_id: user_id.to_string(),
            public_key: "PUB".to_string(),
            private_key: "PRIV".to_string(),
            published: false,
        }
    }

    #[test]
    fn test_memory_store_last_write_wins() {
        let store = MemoryKeyStore::new();
        assert!(store.load("alice").unwrap().is_none());

        store.save(&sample("alice")).unwrap();
        let mut updated = sample("alice");
        updated.public_key = "PUB2".to_string();
        store.save(&updated).unwrap();

        assert_eq!(store.load("alice").unwrap().unwrap().public_key, "PUB2");
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let store = FileKeyStore::new(std::env::temp_dir());
        assert!(store.load("../etc/passwd").is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", sample("alice"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("PRIV"));
    }
}
