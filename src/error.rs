//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid cache configuration (rejected at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// The coordinator worker has stopped
    #[error("Cache coordinator is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Disk record encoding error
    #[error("Entry encoding failed: {0}")]
    Encode(String),

    /// Stored payload or record failed to decode
    #[error("Corrupted entry {key}: {reason}")]
    Corruption { key: String, reason: String },

    // =========================================================================
    // Codec Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (bad key, truncated payload or tag mismatch)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Config file parse error
    #[error("Failed to parse config file {path}: {reason}")]
    ConfigParse { path: String, reason: String },
}

impl Error {
    /// Whether this error means stored bytes can no longer be decoded
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption { .. }
                | Error::DecompressionFailed { .. }
                | Error::DecryptionFailed(_)
        )
    }
}
