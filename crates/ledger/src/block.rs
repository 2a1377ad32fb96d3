//! Fixed-capacity, hash-linked block of transactions.
//!
//! Lifecycle: Empty -> Partial -> Full & unsigned -> Sealed. Every mutation
//! is persisted through the [`BlockStore`] before the call returns, so each
//! appended transaction is its own durable write.

use tracing::{debug, error, info};

use cellar_crypto::{content_hash, verify, ContentHash, PublicKey, ZERO_HASH};

use crate::error::{LedgerError, LedgerResult};
use crate::store::BlockStore;
use crate::transaction::Transaction;

/// Transactions per block.
pub const BLOCK_CAPACITY: usize = 5;

/// A ledger block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub(crate) ordinal: u64,
    pub(crate) previous_hash: ContentHash,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) signature: Option<Vec<u8>>,
}

impl Block {
    /// Creates an empty block and persists it immediately.
    pub fn create(store: &BlockStore, ordinal: u64, previous_hash: ContentHash) -> LedgerResult<Self> {
        let block = Self {
            ordinal,
            previous_hash,
            transactions: Vec::with_capacity(BLOCK_CAPACITY),
            signature: None,
        };
        store.save(&block)?;
        info!(
            ordinal,
            previous_hash = %hex::encode(previous_hash),
            "Block created"
        );
        Ok(block)
    }

    /// Appends `tx` and persists the block.
    ///
    /// Returns `false` without touching anything when the block is already
    /// full.
    pub fn append(&mut self, store: &BlockStore, tx: Transaction) -> LedgerResult<bool> {
        if self.is_full() {
            debug!(ordinal = self.ordinal, "Append to full block ignored");
            return Ok(false);
        }
        self.transactions.push(tx);
        if let Err(e) = store.save(self) {
            self.transactions.pop();
            return Err(e);
        }
        debug!(
            ordinal = self.ordinal,
            count = self.transactions.len(),
            "Transaction appended to block"
        );
        Ok(true)
    }

    /// Stores the server signature and persists the block.
    ///
    /// Sealing is one-way: only a full, unsigned block can be sealed.
    pub fn seal(&mut self, store: &BlockStore, signature: Vec<u8>) -> LedgerResult<()> {
        if !self.is_full() {
            return Err(LedgerError::NotFull {
                ordinal: self.ordinal,
                count: self.transactions.len(),
            });
        }
        if self.signature.is_some() {
            return Err(LedgerError::AlreadySealed {
                ordinal: self.ordinal,
            });
        }
        self.signature = Some(signature);
        if let Err(e) = store.save(self) {
            self.signature = None;
            return Err(e);
        }
        info!(ordinal = self.ordinal, "Block sealed");
        Ok(())
    }

    /// Drops the last transaction and any signature, then persists. Used to
    /// back out an append whose seal or successor could not be written.
    pub(crate) fn undo_append(&mut self, store: &BlockStore) -> LedgerResult<()> {
        self.signature = None;
        self.transactions.pop();
        store.save(self)
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() == BLOCK_CAPACITY
    }

    pub fn is_sealed(&self) -> bool {
        self.signature.is_some()
    }

    /// SHA-256 over the rendering of every transaction, one per line. The
    /// block signature is never part of it.
    pub fn content_hash(&self) -> ContentHash {
        let mut rendered = String::new();
        for tx in &self.transactions {
            rendered.push_str(&tx.to_string());
            rendered.push('\n');
        }
        content_hash(rendered.as_bytes())
    }

    /// Checks the link to the predecessor on disk and, for a full block, the
    /// server signature.
    pub fn validate(&self, store: &BlockStore, server_key: &PublicKey) -> LedgerResult<()> {
        self.validate_link(store)?;
        if self.is_full() {
            self.validate_seal(server_key)?;
        }
        Ok(())
    }

    pub fn is_valid(&self, store: &BlockStore, server_key: &PublicKey) -> bool {
        self.validate(store, server_key).is_ok()
    }

    /// Only block 1 may carry the zero hash; any later block must match the
    /// recomputed content hash of its predecessor's file.
    pub(crate) fn validate_link(&self, store: &BlockStore) -> LedgerResult<()> {
        if self.ordinal == 1 {
            if self.previous_hash != ZERO_HASH {
                return Err(self.corrupt("first block has a non-zero previous hash"));
            }
            return Ok(());
        }
        if self.previous_hash == ZERO_HASH {
            return Err(self.corrupt("non-first block has a zero previous hash"));
        }

        let previous = store.load(self.ordinal - 1)?;
        if previous.content_hash() != self.previous_hash {
            return Err(self.corrupt(format!(
                "previous hash {} does not match block {}",
                hex::encode(self.previous_hash),
                previous.ordinal
            )));
        }
        Ok(())
    }

    pub(crate) fn validate_seal(&self, server_key: &PublicKey) -> LedgerResult<()> {
        let Some(signature) = &self.signature else {
            return Err(self.corrupt("full block is not signed"));
        };
        if !verify(server_key, &self.content_hash(), signature) {
            return Err(self.corrupt("server signature does not verify"));
        }
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        let err = LedgerError::corruption(self.ordinal, reason);
        error!(ordinal = self.ordinal, error = %err, "Block validation failed");
        err
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn previous_hash(&self) -> &ContentHash {
        &self.previous_hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }
}
