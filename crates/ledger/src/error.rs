//! Ledger error types.

use thiserror::Error;

use cellar_crypto::CryptoError;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Broken hash chain, bad block signature, or a missing or unreadable
    /// block file. The ledger cannot be trusted and the server must not start.
    #[error("Ledger corrupted at block {ordinal}: {reason}")]
    Corruption { ordinal: u64, reason: String },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("No public key known for signer {user}")]
    UnknownSigner { user: String },

    /// The client signature does not cover the transaction's canonical
    /// payload. Nothing was recorded.
    #[error("Signature by {user} does not verify")]
    InvalidSignature { user: String },

    #[error("Block {ordinal} is full")]
    BlockFull { ordinal: u64 },

    #[error("Block {ordinal} holds {count} transactions and cannot be sealed")]
    NotFull { ordinal: u64, count: usize },

    #[error("Block {ordinal} is already sealed")]
    AlreadySealed { ordinal: u64 },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub(crate) fn corruption(ordinal: u64, reason: impl Into<String>) -> Self {
        LedgerError::Corruption {
            ordinal,
            reason: reason.into(),
        }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, LedgerError::Corruption { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
