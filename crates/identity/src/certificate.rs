//! Self-signed user certificates.
//!
//! A certificate binds a user id to a P-256 public key. The holder signs
//! `subject || public_key || issued_at (big-endian u64)` with the matching
//! private key, proving possession at issue time.
//!
//! Certificates travel and are stored as PEM-style text: the base64 of the
//! JSON encoding between `BEGIN CERTIFICATE` / `END CERTIFICATE` lines.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use cellar_core::UserId;
use cellar_crypto::{sign, verify, PrivateKey, PublicKey};

use crate::error::{IdentityError, IdentityResult};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";
const PEM_LINE: usize = 64;

/// A user certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// User id being certified
    pub subject: UserId,
    /// SEC1-encoded P-256 public key
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Issue time (Unix milliseconds)
    pub issued_at: u64,
    /// Self-signature (DER)
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Issues a certificate for `subject` signed by its own key.
    pub fn self_signed(subject: impl Into<UserId>, key: &PrivateKey) -> IdentityResult<Self> {
        let mut cert = Self {
            subject: subject.into(),
            public_key: key.public_key().to_sec1_bytes(),
            issued_at: current_timestamp(),
            signature: Vec::new(),
        };
        cert.signature = sign(key, &cert.signed_bytes())?;
        Ok(cert)
    }

    /// The certified key.
    pub fn public_key(&self) -> IdentityResult<PublicKey> {
        Ok(PublicKey::from_sec1_bytes(&self.public_key)?)
    }

    /// Whether the self-signature holds. A key that does not decode counts
    /// as a failure.
    pub fn is_self_signed(&self) -> bool {
        match self.public_key() {
            Ok(key) => verify(&key, &self.signed_bytes(), &self.signature),
            Err(_) => false,
        }
    }

    /// `len(subject) || subject || len(key) || key || issued_at`, lengths as
    /// big-endian u32.
    fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.subject.len() + self.public_key.len() + 16);
        bytes.extend_from_slice(&(self.subject.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.subject.as_bytes());
        bytes.extend_from_slice(&(self.public_key.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.public_key);
        bytes.extend_from_slice(&self.issued_at.to_be_bytes());
        bytes
    }

    pub fn to_pem(&self) -> IdentityResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;
        let body = BASE64.encode(json);

        let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE + 64);
        pem.push_str(PEM_BEGIN);
        pem.push('\n');
        for chunk in body.as_bytes().chunks(PEM_LINE) {
            // base64 output is ASCII
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        Ok(pem)
    }

    pub fn from_pem(pem: &str) -> IdentityResult<Self> {
        let malformed = |reason: &str| IdentityError::MalformedCertificate(reason.to_string());

        let trimmed = pem.trim();
        let inner = trimmed
            .strip_prefix(PEM_BEGIN)
            .and_then(|rest| rest.strip_suffix(PEM_END))
            .ok_or_else(|| malformed("missing PEM armor"))?;
        let body: String = inner.chars().filter(|c| !c.is_whitespace()).collect();

        let json = BASE64
            .decode(body)
            .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| IdentityError::MalformedCertificate(e.to_string()))
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_signed_certificate() {
        let key = PrivateKey::generate();
        let cert = Certificate::self_signed("alice", &key).unwrap();

        assert_eq!(cert.subject, "alice");
        assert!(cert.is_self_signed());
        assert_eq!(cert.public_key().unwrap(), key.public_key());
    }

    #[test]
    fn test_swapped_key_breaks_self_signature() {
        let cert = Certificate::self_signed("alice", &PrivateKey::generate()).unwrap();
        let mut forged = cert.clone();
        forged.public_key = PrivateKey::generate().public_key().to_sec1_bytes();
        assert!(!forged.is_self_signed());

        let mut renamed = cert;
        renamed.subject = "mallory".into();
        assert!(!renamed.is_self_signed());
    }

    #[test]
    fn test_field_boundaries_are_signed() {
        let cert = Certificate::self_signed("alice", &PrivateKey::generate()).unwrap();

        // Moving the last subject byte into the key keeps the concatenation
        // the same.
        let mut shifted = cert.clone();
        shifted.subject = "alic".into();
        shifted.public_key = [b"e".as_slice(), cert.public_key.as_slice()].concat();

        assert_ne!(shifted.signed_bytes(), cert.signed_bytes());
        assert!(!shifted.is_self_signed());
    }

    #[test]
    fn test_garbage_key_is_not_self_signed() {
        let mut cert = Certificate::self_signed("alice", &PrivateKey::generate()).unwrap();
        cert.public_key = vec![4, 1, 2, 3];
        assert!(!cert.is_self_signed());
        assert!(cert.public_key().is_err());
    }

    #[test]
    fn test_pem_armor() {
        let cert = Certificate::self_signed("alice", &PrivateKey::generate()).unwrap();
        let pem = cert.to_pem().unwrap();

        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.trim_end().ends_with("-----END CERTIFICATE-----"));
        assert!(pem.lines().all(|l| l.len() <= 64 || l.starts_with("-----")));
        assert_eq!(Certificate::from_pem(&pem).unwrap(), cert);
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        assert!(Certificate::from_pem("hello").is_err());
        assert!(Certificate::from_pem("-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----").is_err());
        let not_json = format!("{}\n{}\n{}", PEM_BEGIN, BASE64.encode("nope"), PEM_END);
        assert!(matches!(
            Certificate::from_pem(&not_json),
            Err(IdentityError::MalformedCertificate(_))
        ));
    }
}
