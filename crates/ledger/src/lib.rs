//! Cellar Ledger
//!
//! Append-only, hash-chained record of every buy and sell.
//!
//! # Architecture
//!
//! - [`Transaction`]: one signed trade, immutable once built
//! - [`Block`]: up to [`BLOCK_CAPACITY`] transactions, linked to its
//!   predecessor by content hash and signed by the server once full
//! - [`BlockStore`]: one JSON file per block, rewritten atomically on every
//!   mutation
//! - [`Ledger`]: replays and validates the chain at startup, then owns the
//!   single open block behind a write lock
//!
//! # Guarantees
//!
//! - Gap-free ordinals starting at 1
//! - `previous_hash` of block n equals the content hash of block n-1
//! - Every full block carries a server signature over its content hash
//! - Any violation found on disk is a [`LedgerError::Corruption`] and is never
//!   repaired silently

pub mod block;
pub mod error;
pub mod ledger;
pub mod store;
pub mod transaction;

pub use block::{Block, BLOCK_CAPACITY};
pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use store::BlockStore;
pub use transaction::{Transaction, TransactionKind};
