//! Hashing: SHA-256 content hashes and HMAC-SHA256 keyed digests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::cipher::FileKey;
use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// A SHA-256 digest.
pub type ContentHash = [u8; 32];

/// Previous-hash sentinel of the first block.
pub const ZERO_HASH: ContentHash = [0u8; 32];

/// SHA-256 of `data`.
pub fn content_hash(data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256 of `data` under the file key, base64-rendered.
pub fn keyed_digest(key: &FileKey, data: &[u8]) -> CryptoResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).map_err(|e| {
        CryptoError::MalformedKey {
            reason: e.to_string(),
        }
    })?;
    mac.update(data);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_known_vector() {
        let hash = content_hash(b"abc");
        assert_eq!(
            hash[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") starts with ba7816bf"
        );
    }

    #[test]
    fn test_keyed_digest_depends_on_key_and_data() {
        let key = FileKey::derive("one");
        let a = keyed_digest(&key, b"contents").unwrap();
        assert_eq!(a, keyed_digest(&key, b"contents").unwrap());
        assert_ne!(a, keyed_digest(&key, b"contents!").unwrap());
        assert_ne!(a, keyed_digest(&FileKey::derive("two"), b"contents").unwrap());
    }

    #[test]
    fn test_keyed_digest_is_base64() {
        let digest = keyed_digest(&FileKey::derive("k"), b"").unwrap();
        assert_eq!(BASE64.decode(&digest).unwrap().len(), 32);
        assert!(!digest.contains(':'));
    }
}
