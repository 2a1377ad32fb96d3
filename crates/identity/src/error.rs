//! Error types for identity and login.

use thiserror::Error;

use cellar_crypto::CryptoError;
use cellar_integrity::IntegrityError;

/// A login attempt that must be rejected.
///
/// Reported to the client as a plain failure; the connection then closes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("Echoed nonce does not match the challenge for {user}")]
    NonceMismatch { user: String },

    #[error("Signature over the nonce does not verify for {user}")]
    BadSignature { user: String },

    #[error("Certificate subject {subject} does not match user {user}")]
    SubjectMismatch { user: String, subject: String },

    #[error("Certificate rejected for {user}: {reason}")]
    InvalidCertificate { user: String, reason: String },

    #[error("Unknown user {user}")]
    UnknownUser { user: String },

    #[error("User {user} is already registered")]
    AlreadyRegistered { user: String },

    #[error("Response does not match the {expected} login phase for {user}")]
    PhaseMismatch { user: String, expected: &'static str },
}

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Invalid user id '{0}'")]
    InvalidUserId(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Corrupt credentials file at line {line}: {reason}")]
    CorruptCredentials { line: usize, reason: String },

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
