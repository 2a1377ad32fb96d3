//! Registered user certificates.
//!
//! Layout under the certificate directory:
//!
//! - `<user>.cer`: the user's certificate in PEM form
//! - the credentials file: one `user:certfile` line per registered user,
//!   append-only
//!
//! Every file is tracked by the integrity manifest and verified on open.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use cellar_core::fs::write_atomic;
use cellar_core::UserId;
use cellar_crypto::PublicKey;
use cellar_integrity::IntegrityManifest;

use crate::certificate::Certificate;
use crate::error::{AuthenticationError, IdentityError, IdentityResult};

/// Checks that `user` is safe to use as a file name and a credentials key.
pub fn validate_user_id(user: &str) -> IdentityResult<()> {
    let ok = !user.is_empty()
        && !user.starts_with('.')
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if ok {
        Ok(())
    } else {
        Err(IdentityError::InvalidUserId(user.to_string()))
    }
}

/// The user id to certificate mapping, persisted and integrity-tracked.
pub struct CertificateStore {
    cert_dir: PathBuf,
    credentials: PathBuf,
    manifest: Arc<IntegrityManifest>,
    users: RwLock<HashMap<UserId, Certificate>>,
}

impl CertificateStore {
    /// Loads all registered users, verifying every file against the manifest.
    pub fn open(
        cert_dir: impl Into<PathBuf>,
        credentials: impl Into<PathBuf>,
        manifest: Arc<IntegrityManifest>,
    ) -> IdentityResult<Self> {
        let cert_dir = cert_dir.into();
        let credentials = credentials.into();
        fs::create_dir_all(&cert_dir)?;

        manifest.verify(&credentials)?;
        let mut users = HashMap::new();
        if credentials.exists() {
            let text = fs::read_to_string(&credentials)?;
            for (idx, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let corrupt = |reason: String| IdentityError::CorruptCredentials {
                    line: idx + 1,
                    reason,
                };
                let (user, cert_file) = line
                    .split_once(':')
                    .ok_or_else(|| corrupt("missing ':' separator".into()))?;
                validate_user_id(user).map_err(|e| corrupt(e.to_string()))?;
                if users.contains_key(user) {
                    return Err(corrupt(format!("duplicate user {}", user)));
                }

                let cert = Self::load_certificate(&cert_dir.join(cert_file), &manifest)
                    .map_err(|e| match e {
                        IdentityError::Integrity(_) => e,
                        other => corrupt(other.to_string()),
                    })?;
                if cert.subject != user {
                    return Err(corrupt(format!("certificate subject is {}", cert.subject)));
                }
                if !cert.is_self_signed() {
                    return Err(corrupt(format!("certificate of {} is not self-signed", user)));
                }
                users.insert(user.to_string(), cert);
            }
        }

        info!(users = users.len(), dir = %cert_dir.display(), "Certificate store opened");
        Ok(Self {
            cert_dir,
            credentials,
            manifest,
            users: RwLock::new(users),
        })
    }

    fn load_certificate(path: &Path, manifest: &IntegrityManifest) -> IdentityResult<Certificate> {
        manifest.verify(path)?;
        let pem = fs::read_to_string(path)?;
        Certificate::from_pem(&pem)
    }

    pub fn is_registered(&self, user: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user)
    }

    pub fn certificate(&self, user: &str) -> Option<Certificate> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
    }

    /// The trust anchor key of `user`, if registered.
    pub fn public_key(&self, user: &str) -> IdentityResult<Option<PublicKey>> {
        self.certificate(user).map(|c| c.public_key()).transpose()
    }

    /// Registered user ids, sorted.
    pub fn users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        users.sort();
        users
    }

    /// Records `cert` as the permanent trust anchor of `user`.
    ///
    /// Rejects invalid ids, a subject that differs from `user`, a failing
    /// self-signature, and users that are already registered.
    pub fn register(&self, user: &str, cert: Certificate) -> IdentityResult<()> {
        validate_user_id(user)?;
        if cert.subject != user {
            return Err(AuthenticationError::SubjectMismatch {
                user: user.to_string(),
                subject: cert.subject.clone(),
            }
            .into());
        }
        if !cert.is_self_signed() {
            return Err(AuthenticationError::InvalidCertificate {
                user: user.to_string(),
                reason: "self-signature does not verify".into(),
            }
            .into());
        }

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(user) {
            return Err(AuthenticationError::AlreadyRegistered {
                user: user.to_string(),
            }
            .into());
        }

        let cert_file = format!("{}.cer", user);
        let cert_path = self.cert_dir.join(&cert_file);
        write_atomic(&cert_path, cert.to_pem()?.as_bytes())?;
        self.manifest.update(&cert_path)?;

        let mut credentials = if self.credentials.exists() {
            fs::read_to_string(&self.credentials)?
        } else {
            String::new()
        };
        if !credentials.is_empty() && !credentials.ends_with('\n') {
            credentials.push('\n');
        }
        credentials.push_str(&format!("{}:{}\n", user, cert_file));
        write_atomic(&self.credentials, credentials.as_bytes())?;
        self.manifest.update(&self.credentials)?;

        users.insert(user.to_string(), cert);
        debug!(user_id = %user, "Certificate stored");
        Ok(())
    }
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("cert_dir", &self.cert_dir)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
