//! AES-256-GCM encrypted, file-backed key-value store.
//!
//! Each key lives in its own file under the store directory. The file
//! name is the SHA-256 hex digest of the key, so key names never reach
//! the filesystem. File layout:
//!
//! ```text
//! [version(1)][nonce(12)][ciphertext + tag(variable)]
//! ```
//!
//! The cipher key is the SHA-256 digest of a caller-supplied secret.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StorageError;
use crate::kv::KeyValueStore;

/// On-disk format version written as the first byte of every entry.
const FORMAT_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// File extension for entry files; `clear` only touches these.
const ENTRY_EXTENSION: &str = "bin";

/// Encrypted store rooted at a directory.
#[derive(Clone)]
pub struct EncryptedFileStore {
    dir: PathBuf,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Open (creating if needed) a store in `dir`, keyed by `secret`.
    pub async fn open(dir: impl AsRef<Path>, secret: &[u8]) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let key = Sha256::digest(secret);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| StorageError::Crypto(e.to_string()))?;

        tracing::debug!(dir = %dir.display(), "Opened encrypted store");
        Ok(Self { dir, cipher })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.dir.join(name).with_extension(ENTRY_EXTENSION)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open_sealed(&self, key: &str, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        if data.len() < 1 + NONCE_LEN {
            return Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: "entry shorter than header".into(),
            });
        }
        if data[0] != FORMAT_VERSION {
            return Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: format!("unsupported format version {}", data[0]),
            });
        }

        let nonce = Nonce::from_slice(&data[1..1 + NONCE_LEN]);
        self.cipher
            .decrypt(nonce, &data[1 + NONCE_LEN..])
            .map_err(|e| StorageError::Crypto(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for EncryptedFileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let data = match tokio::fs::read(self.entry_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.open_sealed(key, &data)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.seal(value.as_bytes())?;
        let path = self.entry_path(key);

        // Write-then-rename so a crash never leaves a half-written entry.
        // Every write gets its own temp file; concurrent writers to one key
        // race only on the rename, and the last rename wins.
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, &sealed).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        tracing::info!(dir = %self.dir.display(), removed, "Cleared encrypted store");
        Ok(())
    }
}
