//! Server signing key management.
//!
//! The server's private key lives on disk encrypted under the [`FileKey`].
//! It is created on first start and reloaded afterwards.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::cipher::{symmetric_decrypt, symmetric_encrypt, FileKey};
use crate::error::CryptoResult;
use crate::signing::{PrivateKey, PublicKey};

/// The key pair the server seals ledger blocks with.
#[derive(Debug, Clone)]
pub struct ServerKeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl ServerKeyPair {
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Loads the encrypted key at `path`, generating and storing one if the
    /// file does not exist.
    ///
    /// A present but undecryptable file is an error, never a reason to
    /// generate a replacement: blocks sealed under the old key would stop
    /// verifying.
    pub fn load_or_generate(path: &Path, file_key: &FileKey) -> CryptoResult<Self> {
        if path.exists() {
            let sealed = fs::read(path)?;
            let bytes = zeroize::Zeroizing::new(symmetric_decrypt(file_key, &sealed)?);
            let private = PrivateKey::from_bytes(&bytes)?;
            info!(path = %path.display(), "Loaded server signing key");
            return Ok(Self::from_private(private));
        }

        let private = PrivateKey::generate();
        let sealed = symmetric_encrypt(file_key, &private.to_bytes())?;
        cellar_core::fs::write_atomic(path, &sealed)?;
        info!(path = %path.display(), "Generated new server signing key");
        Ok(Self::from_private(private))
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{sign, verify};
    use tempfile::tempdir;

    #[test]
    fn test_generate_then_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("server.key");
        let file_key = FileKey::derive("pass");

        let first = ServerKeyPair::load_or_generate(&path, &file_key).unwrap();
        assert!(path.exists());
        let second = ServerKeyPair::load_or_generate(&path, &file_key).unwrap();
        assert_eq!(first.public_key(), second.public_key());

        let sig = sign(second.private_key(), b"block").unwrap();
        assert!(verify(first.public_key(), b"block", &sig));
    }

    #[test]
    fn test_key_is_not_stored_in_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.key");
        let pair = ServerKeyPair::load_or_generate(&path, &FileKey::derive("pass")).unwrap();

        let stored = fs::read(&path).unwrap();
        let raw = pair.private_key().to_bytes();
        assert!(!stored.windows(raw.len()).any(|w| w == raw.as_slice()));
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.key");
        ServerKeyPair::load_or_generate(&path, &FileKey::derive("pass")).unwrap();

        let result = ServerKeyPair::load_or_generate(&path, &FileKey::derive("other"));
        assert!(result.is_err());
    }
}
