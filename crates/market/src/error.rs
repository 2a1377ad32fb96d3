//! Trade errors.
//!
//! [`DomainError`] covers expected business outcomes that are reported to
//! the user while the connection carries on. Everything else in
//! [`TradeError`] aborts the operation.

use thiserror::Error;

use cellar_core::Price;
use cellar_crypto::CryptoError;
use cellar_identity::IdentityError;
use cellar_integrity::IntegrityError;
use cellar_ledger::LedgerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Wine {0} does not exist")]
    WineNotFound(String),

    #[error("User {0} does not exist")]
    UserNotFound(String),

    #[error("{seller} has no listing for {wine}")]
    ListingNotFound { wine: String, seller: String },

    #[error("Only {available} units of {wine} available from {seller}, {requested} requested")]
    InsufficientStock {
        wine: String,
        seller: String,
        available: u32,
        requested: u32,
    },

    #[error("{user} has {balance}, needs {required}")]
    InsufficientBalance {
        user: String,
        balance: Price,
        required: Price,
    },

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("Invalid wine id '{0}'")]
    InvalidWineId(String),

    #[error("Amount out of range")]
    AmountOverflow,
}

#[derive(Error, Debug)]
pub enum TradeError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request signature does not match the user's certificate. Nothing
    /// was changed.
    #[error("Signature of {user} does not verify")]
    InvalidSignature { user: String },

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TradeError {
    /// Whether the request can be answered with an error message and the
    /// connection kept open.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TradeError::Domain(_) | TradeError::InvalidSignature { .. })
    }
}

pub type TradeResult<T> = Result<T, TradeError>;
