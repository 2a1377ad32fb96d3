//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
///
/// A signature that simply fails to verify is not an error.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Malformed key: {reason}")]
    MalformedKey { reason: String },

    #[error("Signing failed: {reason}")]
    Signing { reason: String },

    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },

    #[error("Decryption failed: {reason}")]
    Decryption { reason: String },

    #[error("Malformed ciphertext: {reason}")]
    MalformedCiphertext { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
