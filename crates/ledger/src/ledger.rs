//! The block chain ledger.
//!
//! [`Ledger::open`] replays the chain from disk before anything is served:
//! starting at block 1 it validates each block and follows successors while
//! blocks are full, stopping at the first open block. Afterwards the ledger
//! owns that open block exclusively; every append, seal and chain advance
//! happens under one write lock.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use cellar_crypto::{sign, PublicKey, ServerKeyPair, ZERO_HASH};

use crate::block::Block;
use crate::error::{LedgerError, LedgerResult};
use crate::store::BlockStore;
use crate::transaction::Transaction;

struct LedgerState {
    open_block: Block,
}

/// Append-only chain of server-signed blocks.
pub struct Ledger {
    store: BlockStore,
    keys: ServerKeyPair,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Opens the ledger in `store`, creating block 1 on first start.
    ///
    /// The chain on disk must be complete: every full block sealed by this
    /// server and followed by its successor, ending in exactly one open
    /// block. Anything else, including a full block left unsigned or a
    /// missing successor file, fails with [`LedgerError::Corruption`] and
    /// is left untouched on disk.
    pub fn open(store: BlockStore, keys: ServerKeyPair) -> LedgerResult<Self> {
        info!(dir = %store.dir().display(), "Opening ledger");

        let open_block = if store.exists(1) {
            Self::replay(&store, &keys)?
        } else {
            info!("No ledger found, creating first block");
            Block::create(&store, 1, ZERO_HASH)?
        };

        info!(
            open_block = open_block.ordinal(),
            pending = open_block.transactions().len(),
            "Ledger ready"
        );

        Ok(Self {
            store,
            keys,
            state: Mutex::new(LedgerState { open_block }),
        })
    }

    fn replay(store: &BlockStore, keys: &ServerKeyPair) -> LedgerResult<Block> {
        let mut ordinal = 1;
        loop {
            let block = store.load(ordinal)?;
            block.validate_link(store)?;
            let has_successor = store.exists(ordinal + 1);

            if !block.is_full() {
                if has_successor {
                    return Err(LedgerError::corruption(
                        ordinal,
                        "open block has a successor",
                    ));
                }
                return Ok(block);
            }

            block.validate_seal(keys.public_key())?;
            if !has_successor {
                return Err(LedgerError::corruption(
                    ordinal + 1,
                    "block file after a sealed block is missing",
                ));
            }

            debug!(ordinal, "Block verified");
            ordinal += 1;
        }
    }

    /// Appends `tx` to the open block, sealing it and chaining a new one when
    /// it fills up. Returns the ordinal of the block `tx` landed in.
    ///
    /// `signer_key` resolves the public key registered for the transaction's
    /// user. The signature is checked against the canonical payload before
    /// anything is written; an unknown signer or a bad signature records
    /// nothing.
    ///
    /// If the block fills up but cannot be sealed or chained, the append is
    /// backed out and the error returned, so a failed call leaves the ledger
    /// as it was.
    pub fn add_transaction<F>(&self, tx: Transaction, signer_key: F) -> LedgerResult<u64>
    where
        F: FnOnce(&str) -> Option<PublicKey>,
    {
        let Some(key) = signer_key(tx.user()) else {
            return Err(LedgerError::UnknownSigner {
                user: tx.user().to_string(),
            });
        };
        if !tx.is_signature_valid(&key) {
            warn!(user_id = %tx.user(), wine = %tx.wine(), "Transaction rejected: bad signature");
            return Err(LedgerError::InvalidSignature {
                user: tx.user().to_string(),
            });
        }

        let mut state = self.lock();
        let block = &mut state.open_block;
        let ordinal = block.ordinal();

        if !block.append(&self.store, tx)? {
            return Err(LedgerError::BlockFull { ordinal });
        }

        if block.is_full() {
            match self.advance(block) {
                Ok(next) => {
                    state.open_block = next;
                    info!(sealed = ordinal, open_block = ordinal + 1, "Ledger advanced to next block");
                }
                Err(e) => {
                    error!(ordinal, error = %e, "Sealing failed, backing out the append");
                    if let Err(undo) = block.undo_append(&self.store) {
                        error!(ordinal, error = %undo, "Could not back out the append");
                    }
                    return Err(e);
                }
            }
        }
        Ok(ordinal)
    }

    /// Seals the full `block` and creates its successor.
    fn advance(&self, block: &mut Block) -> LedgerResult<Block> {
        let hash = block.content_hash();
        let signature = sign(self.keys.private_key(), &hash)?;
        block.seal(&self.store, signature)?;
        Block::create(&self.store, block.ordinal() + 1, hash)
    }

    /// Re-verifies the chain from disk and renders it as text, blocks in
    /// chain order separated by a blank line.
    pub fn list_all_transactions(&self) -> LedgerResult<String> {
        let state = self.lock();
        let blocks = self.verified_chain(&state)?;

        let mut out = String::new();
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!(
                "Block {} (previous hash {})\n",
                block.ordinal(),
                hex::encode(block.previous_hash())
            ));
            if block.transactions().is_empty() {
                out.push_str("  (no transactions)\n");
            }
            for (n, tx) in block.transactions().iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", n + 1, tx));
            }
            if let Some(signature) = block.signature() {
                out.push_str(&format!("  Server signature: {}\n", hex::encode(signature)));
            }
        }
        Ok(out)
    }

    /// Every recorded transaction, re-verified, in chain order.
    pub fn transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let state = self.lock();
        Ok(self
            .verified_chain(&state)?
            .into_iter()
            .flat_map(|block| block.transactions)
            .collect())
    }

    pub fn open_block_ordinal(&self) -> u64 {
        self.lock().open_block.ordinal()
    }

    /// Number of blocks on disk, including the open one.
    pub fn block_count(&self) -> u64 {
        self.open_block_ordinal()
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    fn verified_chain(&self, state: &LedgerState) -> LedgerResult<Vec<Block>> {
        let last = state.open_block.ordinal();
        let mut blocks = Vec::with_capacity(last as usize);
        for ordinal in 1..=last {
            let block = self.store.load(ordinal)?;
            block.validate(&self.store, self.keys.public_key())?;
            if ordinal < last && !block.is_sealed() {
                return Err(LedgerError::corruption(ordinal, "block before the open block is not sealed"));
            }
            blocks.push(block);
        }
        if blocks.last() != Some(&state.open_block) {
            return Err(LedgerError::corruption(last, "open block on disk differs from memory"));
        }
        debug!(blocks = blocks.len(), "Ledger chain re-verified");
        Ok(blocks)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("dir", &self.store.dir())
            .finish_non_exhaustive()
    }
}
