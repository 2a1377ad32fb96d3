//! One file per block.
//!
//! Files are named `block_<ordinal>.blk` and hold pretty-printed JSON:
//!
//! ```text
//! {
//!   "ordinal": 2,
//!   "previous_hash": "<64 hex chars>",
//!   "transaction_count": 5,
//!   "transactions": [ ... ],
//!   "signature": "<hex DER>"        // only once the block is full
//! }
//! ```
//!
//! Loading is strict: anything that does not describe a well-formed block is
//! reported as corruption of that ordinal.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use cellar_core::fs::write_atomic;
use cellar_crypto::ContentHash;

use crate::block::{Block, BLOCK_CAPACITY};
use crate::error::{LedgerError, LedgerResult};
use crate::transaction::Transaction;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockFile {
    ordinal: u64,
    previous_hash: String,
    transaction_count: usize,
    transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

/// Directory of block files.
#[derive(Debug, Clone)]
pub struct BlockStore {
    dir: PathBuf,
}

impl BlockStore {
    /// Opens (creating if needed) the block directory.
    pub fn open(dir: impl Into<PathBuf>) -> LedgerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ordinal: u64) -> PathBuf {
        self.dir.join(format!("block_{}.blk", ordinal))
    }

    pub fn exists(&self, ordinal: u64) -> bool {
        self.path_for(ordinal).is_file()
    }

    /// Atomically replaces the file of `block`.
    pub fn save(&self, block: &Block) -> LedgerResult<()> {
        let file = BlockFile {
            ordinal: block.ordinal,
            previous_hash: hex::encode(block.previous_hash),
            transaction_count: block.transactions.len(),
            transactions: block.transactions.clone(),
            signature: block.signature.as_ref().map(hex::encode),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| LedgerError::corruption(block.ordinal, format!("cannot encode block: {}", e)))?;
        write_atomic(&self.path_for(block.ordinal), &bytes)?;
        Ok(())
    }

    /// Reads and checks the file of block `ordinal`.
    pub fn load(&self, ordinal: u64) -> LedgerResult<Block> {
        let path = self.path_for(ordinal);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::corruption(ordinal, "block file is missing"));
            }
            Err(e) => {
                return Err(LedgerError::corruption(
                    ordinal,
                    format!("block file is unreadable: {}", e),
                ));
            }
        };
        let corrupt = |reason: String| LedgerError::corruption(ordinal, reason);

        let file: BlockFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("malformed block file: {}", e)))?;

        if file.ordinal != ordinal {
            return Err(corrupt(format!("file claims ordinal {}", file.ordinal)));
        }
        if file.transaction_count != file.transactions.len() {
            return Err(corrupt(format!(
                "count {} does not match {} stored transactions",
                file.transaction_count,
                file.transactions.len()
            )));
        }
        if file.transactions.len() > BLOCK_CAPACITY {
            return Err(corrupt(format!(
                "{} transactions exceed the block capacity",
                file.transactions.len()
            )));
        }
        if file.signature.is_some() && file.transactions.len() < BLOCK_CAPACITY {
            return Err(corrupt("signature present on a block that is not full".into()));
        }
        for tx in &file.transactions {
            tx.validate().map_err(|e| corrupt(e.to_string()))?;
        }

        let previous_hash = decode_hash(&file.previous_hash).map_err(corrupt)?;
        let signature = file
            .signature
            .map(|s| hex::decode(s).map_err(|e| corrupt(format!("bad signature encoding: {}", e))))
            .transpose()?;

        Ok(Block {
            ordinal,
            previous_hash,
            transactions: file.transactions,
            signature,
        })
    }
}

fn decode_hash(raw: &str) -> Result<ContentHash, String> {
    let bytes = hex::decode(raw).map_err(|e| format!("bad previous hash encoding: {}", e))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("previous hash has {} bytes, expected 32", b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_core::Price;
    use cellar_crypto::ZERO_HASH;
    use tempfile::tempdir;

    fn sample_tx(n: u32) -> Transaction {
        Transaction::buy("Douro2020", n + 1, Price::from_cents(1250), "alice", "bob", vec![0x30, n as u8]).unwrap()
    }

    #[test]
    fn test_full_block_reloads_identically() {
        let dir = tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        let mut block = Block::create(&store, 1, ZERO_HASH).unwrap();
        for n in 0..BLOCK_CAPACITY as u32 {
            block.append(&store, sample_tx(n)).unwrap();
        }
        block.seal(&store, vec![0xde, 0xad]).unwrap();

        let loaded = store.load(1).unwrap();
        assert_eq!(loaded, block);
        assert_eq!(loaded.signature(), Some(&[0xde, 0xad][..]));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        let mut block = Block::create(&store, 3, [0x11; 32]).unwrap();
        block.append(&store, sample_tx(0)).unwrap();

        let path = dir.path().join("block_3.blk");
        let json: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(json["ordinal"], 3);
        assert_eq!(json["previous_hash"], "11".repeat(32));
        assert_eq!(json["transaction_count"], 1);
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn test_missing_file_is_corruption() {
        let dir = tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load(4),
            Err(LedgerError::Corruption { ordinal: 4, .. })
        ));
    }

    #[test]
    fn test_strict_loading() {
        let dir = tempdir().unwrap();
        let store = BlockStore::open(dir.path()).unwrap();
        let mut block = Block::create(&store, 1, ZERO_HASH).unwrap();
        block.append(&store, sample_tx(0)).unwrap();
        let path = store.path_for(1);
        let original: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();

        let cases: Vec<(&str, serde_json::Value)> = vec![
            ("transaction_count", serde_json::json!(2)),
            ("ordinal", serde_json::json!(9)),
            ("previous_hash", serde_json::json!("abcd")),
            ("signature", serde_json::json!("00")),
        ];
        for (field, value) in cases {
            let mut doctored = original.clone();
            doctored[field] = value;
            fs::write(&path, serde_json::to_vec(&doctored).unwrap()).unwrap();
            assert!(store.load(1).unwrap_err().is_corruption(), "field {}", field);
        }

        fs::write(&path, b"not json").unwrap();
        assert!(store.load(1).unwrap_err().is_corruption());
    }
}
