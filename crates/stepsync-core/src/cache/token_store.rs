use std::ffi::OsString;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::record::{CredentialRecord, TokenMap};
use crate::crypto::{Cipher, CipherError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("token file is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Whole-map persistence of cached credentials.
pub trait TokenPersistence: Send + Sync {
    /// Load every cached record. Never fails: unreadable state yields an
    /// empty map so every account re-authenticates.
    fn load(&self) -> TokenMap;

    /// Replace the persisted state with `tokens`
    fn save(&self, tokens: &TokenMap) -> Result<(), StoreError>;
}

/// Encrypted single-file token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
    cipher: Cipher,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>, cipher: Cipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, returning `None` when it does not exist
    pub fn try_load(&self) -> Result<Option<TokenMap>, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let plain = self.cipher.decrypt(&data)?;
        let tokens: TokenMap = serde_json::from_slice(&plain)?;
        Ok(Some(tokens))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("tokens"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenPersistence for TokenStore {
    fn load(&self) -> TokenMap {
        match self.try_load() {
            Ok(Some(tokens)) => {
                info!(path = %self.path.display(), accounts = tokens.len(), "Loaded token cache");
                tokens
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No token cache yet");
                TokenMap::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Token cache unreadable (wrong key or damaged file), discarding cached tokens"
                );
                TokenMap::new()
            }
        }
    }

    fn save(&self, tokens: &TokenMap) -> Result<(), StoreError> {
        let plain = serde_json::to_vec(tokens)?;
        let blob = self.cipher.encrypt(&plain)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target and rename over it so an interrupted save
        // leaves the previous file intact
        let tmp = self.temp_path();
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(&blob)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| std::fs::rename(&tmp, &self.path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), accounts = tokens.len(), "Saved token cache");
        Ok(())
    }
}

/// In-memory record map shared by all account workers.
///
/// Each worker checks out the record of its own identity, works on the copy
/// without holding the lock, and commits it back. The lock only guards the
/// map itself.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<TokenMap>>,
}

impl TokenCache {
    pub fn new(tokens: TokenMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tokens)),
        }
    }

    /// Copy of the cached record for `identity`, empty if none
    pub async fn checkout(&self, identity: &str) -> CredentialRecord {
        self.inner
            .lock()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn commit(&self, identity: &str, record: CredentialRecord) {
        self.inner.lock().await.insert(identity.to_string(), record);
    }

    pub async fn snapshot(&self) -> TokenMap {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const KEY: &[u8; 16] = b"0123456789abcdef";

    fn store_in(dir: &Path) -> TokenStore {
        TokenStore::new(dir.join("encrypted_tokens.data"), Cipher::new(KEY).unwrap())
    }

    fn sample_map() -> TokenMap {
        let mut tokens = TokenMap::new();
        tokens.insert(
            "+8613800000000".to_string(),
            CredentialRecord::issued(
                "device".into(),
                "1001".into(),
                "A".into(),
                "B".into(),
                "C".into(),
                Utc::now(),
            ),
        );
        tokens
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.try_load().unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let tokens = sample_map();

        store.save(&tokens).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        let record = &loaded["+8613800000000"];
        assert_eq!(record.app_token.as_deref(), Some("C"));
        assert_eq!(record.user_id.as_deref(), Some("1001"));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample_map()).unwrap();
        let raw = std::fs::read(store.path()).unwrap();
        assert!(!raw.windows(7).any(|w| w == b"+861380"));
    }

    #[test]
    fn test_corrupted_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample_map()).unwrap();

        let mut raw = std::fs::read(store.path()).unwrap();
        raw[20] ^= 0x01;
        std::fs::write(store.path(), &raw).unwrap();

        assert!(matches!(store.try_load(), Err(StoreError::Cipher(_))));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_garbage_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(store.path(), b"not encrypted at all").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_wrong_key_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        store_in(dir.path()).save(&sample_map()).unwrap();

        let other = TokenStore::new(
            dir.path().join("encrypted_tokens.data"),
            Cipher::new(b"fedcba9876543210").unwrap(),
        );
        assert!(other.load().is_empty());
    }

    #[test]
    fn test_non_json_plaintext_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let blob = Cipher::new(KEY).unwrap().encrypt(b"[1, 2, 3]").unwrap();
        std::fs::write(store.path(), blob).unwrap();
        assert!(matches!(store.try_load(), Err(StoreError::Serialize(_))));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&sample_map()).unwrap();
        store.save(&TokenMap::new()).unwrap();
        assert!(store.try_load().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(
            dir.path().join("nested").join("tokens.data"),
            Cipher::new(KEY).unwrap(),
        );
        store.save(&sample_map()).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_checkout_and_commit() {
        let cache = TokenCache::new(sample_map());
        let mut record = cache.checkout("+8613800000000").await;
        assert_eq!(record.login_token.as_deref(), Some("B"));

        record.set_app_token("C2".into(), Utc::now());
        cache.commit("+8613800000000", record).await;
        assert!(cache.checkout("someone@else.com").await.app_token.is_none());

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot["+8613800000000"].app_token.as_deref(), Some("C2"));
        assert_eq!(cache.len().await, 1);
    }
}
