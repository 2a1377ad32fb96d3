//! Error types for catalog integrity checks.

use std::path::PathBuf;
use thiserror::Error;

use cellar_crypto::CryptoError;

/// Errors raised while verifying or updating the integrity manifest.
///
/// Every variant except `Io` means the on-disk state cannot be trusted.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// A tracked file exists but no manifest was ever written
    #[error("Integrity manifest {manifest} is missing but {file} already exists")]
    ManifestMissing {
        /// Manifest location
        manifest: PathBuf,
        /// File found without a manifest
        file: String,
    },

    /// The manifest has no entry for an existing file
    #[error("No manifest entry for {file}")]
    EntryMissing {
        /// Tracked file name
        file: String,
    },

    /// Live digest differs from the recorded one
    #[error("Digest mismatch for {file}: file was modified outside the server")]
    Tampered {
        /// Tracked file name
        file: String,
    },

    /// The manifest tracks a file that is gone
    #[error("Tracked file {file} was deleted")]
    FileMissing {
        /// Tracked file name
        file: String,
    },

    /// A manifest line could not be decrypted or parsed
    #[error("Corrupt manifest line {line}: {reason}")]
    Corrupt {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Cipher or digest failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for integrity operations.
pub type IntegrityResult<T> = Result<T, IntegrityError>;
