//! Pass-phrase based file encryption.
//!
//! The server derives one [`FileKey`] from its file pass-phrase at startup.
//! It keys both the symmetric cipher protecting manifest lines and stored
//! keys, and the HMAC used for catalog file digests.
//!
//! Ciphertext layout: `nonce (12 bytes) || ChaCha20-Poly1305(plaintext)`.
//! Every call to [`symmetric_encrypt`] draws a fresh nonce from the OS RNG.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Salt mixed into the pass-phrase derivation.
const KDF_SALT: [u8; 8] = [0xc9, 0x36, 0x78, 0x99, 0x52, 0x3e, 0xea, 0xf2];

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 20;

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes).
pub const NONCE_SIZE: usize = 12;

const KEY_SIZE: usize = 32;

/// Symmetric key material derived from the server's file pass-phrase.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    /// Derives the key with PBKDF2-HMAC-SHA256.
    pub fn derive(passphrase: &str) -> Self {
        let bytes =
            pbkdf2::pbkdf2_hmac_array::<Sha256, KEY_SIZE>(passphrase.as_bytes(), &KDF_SALT, KDF_ITERATIONS);
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.bytes))
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKey(<redacted>)")
    }
}

/// Encrypts `plaintext`, prepending the freshly drawn nonce.
pub fn symmetric_encrypt(key: &FileKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Strips the leading nonce and decrypts the remainder.
pub fn symmetric_decrypt(key: &FileKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::MalformedCiphertext {
            reason: format!("{} bytes is shorter than the nonce", data.len()),
        });
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);

    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

/// Encrypts a text line and renders it as base64 (no line breaks).
pub fn encrypt_line(key: &FileKey, line: &str) -> CryptoResult<String> {
    Ok(BASE64.encode(symmetric_encrypt(key, line.as_bytes())?))
}

/// Inverse of [`encrypt_line`].
pub fn decrypt_line(key: &FileKey, line: &str) -> CryptoResult<String> {
    let data = BASE64
        .decode(line.trim())
        .map_err(|e| CryptoError::MalformedCiphertext {
            reason: e.to_string(),
        })?;
    let plaintext = symmetric_decrypt(key, &data)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedCiphertext {
        reason: e.to_string(),
    })
}
