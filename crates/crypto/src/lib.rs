//! Cryptographic primitives for the Cellar marketplace.
//!
//! Everything the trust layer needs is exposed as plain functions over typed
//! keys, with no hidden state:
//!
//! - **Digital Signatures**: ECDSA P-256 over SHA-256 for client requests,
//!   login challenges and ledger blocks
//! - **File Encryption**: pass-phrase derived ChaCha20-Poly1305 with a fresh
//!   random nonce per call
//! - **Keyed Digests**: HMAC-SHA256 over catalog file contents
//! - **Content Hashing**: SHA-256 block hashes
//!
//! # Error Semantics
//!
//! A signature that does not verify is a normal `false`. [`CryptoError`] is
//! reserved for malformed keys, undecodable ciphertexts and cipher failures.

pub mod cipher;
pub mod digest;
pub mod error;
pub mod keys;
pub mod signing;

pub use cipher::{decrypt_line, encrypt_line, symmetric_decrypt, symmetric_encrypt, FileKey};
pub use digest::{content_hash, keyed_digest, ContentHash, ZERO_HASH};
pub use error::{CryptoError, CryptoResult};
pub use keys::ServerKeyPair;
pub use signing::{sign, verify, PrivateKey, PublicKey};
