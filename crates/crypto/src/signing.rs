//! Signing and verification - ECDSA P-256 with SHA-256
//!
//! Clients sign their sell/buy requests and login nonces with their private
//! key; the server signs sealed ledger blocks with its own. Signatures are
//! DER-encoded and deterministic (RFC 6979), public keys travel as SEC1
//! bytes inside certificates.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// A P-256 private signing key. Zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Loads a key from its 32-byte scalar encoding.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let inner = SigningKey::from_slice(bytes).map_err(|e| CryptoError::MalformedKey {
            reason: format!("invalid P-256 private key: {}", e),
        })?;
        Ok(Self { inner })
    }

    /// The 32-byte scalar encoding, wiped when the returned buffer drops.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.inner.to_bytes().to_vec())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: VerifyingKey::from(&self.inner),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// A P-256 public verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Decodes a SEC1 (compressed or uncompressed) public key.
    pub fn from_sec1_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let inner = VerifyingKey::from_sec1_bytes(bytes).map_err(|e| CryptoError::MalformedKey {
            reason: format!("invalid P-256 public key: {}", e),
        })?;
        Ok(Self { inner })
    }

    /// Uncompressed SEC1 encoding.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.inner.to_encoded_point(false).as_bytes().to_vec()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sec1 = self.to_sec1_bytes();
        let prefix: String = sec1.iter().take(8).map(|b| format!("{:02x}", b)).collect();
        write!(f, "PublicKey({}..)", prefix)
    }
}

/// Signs `message` and returns the DER-encoded signature.
pub fn sign(key: &PrivateKey, message: &[u8]) -> CryptoResult<Vec<u8>> {
    let signature: Signature = key
        .inner
        .try_sign(message)
        .map_err(|e| CryptoError::Signing {
            reason: e.to_string(),
        })?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Checks a DER-encoded signature over `message`.
///
/// Returns `false` for any signature that does not verify, including bytes
/// that are not a DER signature at all.
pub fn verify(key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    let signature = match Signature::from_der(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    key.inner.verify(message, &signature).is_ok()
}
