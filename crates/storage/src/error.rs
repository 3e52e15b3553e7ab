/// Errors from the key-value store and the helpers layered on it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption or decryption of a stored blob failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Stored bytes are not valid UTF-8 or have an unknown layout.
    #[error("Corrupt entry for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}
