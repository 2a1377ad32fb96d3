//! Challenge-response login.
//!
//! ```text
//! Unauthenticated -> NonceIssued -> NewUserRegistering     -> Authenticated
//!                                -> ExistingUserChallenged    | Rejected
//! ```
//!
//! A [`LoginChallenge`] is consumed by [`AuthenticationGate::complete`], so a
//! nonce answers at most one login attempt.

use rand::{rngs::OsRng, RngCore};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use cellar_core::UserId;
use cellar_crypto::{sign, verify, PrivateKey};

use crate::certificate::Certificate;
use crate::error::{AuthenticationError, IdentityError, IdentityResult};
use crate::store::{validate_user_id, CertificateStore};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// Which reply the server expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    /// No certificate on record: the client must submit one.
    NewUserRegistering,
    /// Certificate on record: the client only signs the nonce.
    ExistingUserChallenged,
}

impl LoginPhase {
    fn name(self) -> &'static str {
        match self {
            LoginPhase::NewUserRegistering => "registration",
            LoginPhase::ExistingUserChallenged => "challenge",
        }
    }
}

/// What the server sends after the client claims a user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    user: UserId,
    nonce: [u8; NONCE_LEN],
    phase: LoginPhase,
}

impl LoginChallenge {
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn phase(&self) -> LoginPhase {
        self.phase
    }

    /// The `isNewUser` flag sent to the client.
    pub fn is_new_user(&self) -> bool {
        self.phase == LoginPhase::NewUserRegistering
    }
}

/// The client's reply to a [`LoginChallenge`].
#[derive(Debug, Clone)]
pub enum LoginResponse {
    /// First login: nonce echoed, signature over it, and the certificate.
    Register {
        nonce: Vec<u8>,
        signature: Vec<u8>,
        certificate: Certificate,
    },
    /// Later logins: signature over the nonce only.
    Challenge { signature: Vec<u8> },
}

impl LoginResponse {
    /// Builds the correct reply for `challenge` on the client side.
    pub fn answer(
        challenge: &LoginChallenge,
        key: &PrivateKey,
        certificate: &Certificate,
    ) -> IdentityResult<Self> {
        let signature = sign(key, challenge.nonce())?;
        Ok(match challenge.phase() {
            LoginPhase::NewUserRegistering => LoginResponse::Register {
                nonce: challenge.nonce().to_vec(),
                signature,
                certificate: certificate.clone(),
            },
            LoginPhase::ExistingUserChallenged => LoginResponse::Challenge { signature },
        })
    }
}

/// Login front door backed by the certificate store.
pub struct AuthenticationGate {
    store: Arc<CertificateStore>,
    login_lock: Mutex<()>,
}

impl AuthenticationGate {
    pub fn new(store: Arc<CertificateStore>) -> Self {
        Self {
            store,
            login_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<CertificateStore> {
        &self.store
    }

    /// Issues a fresh nonce for `user`.
    pub fn begin(&self, user: &str) -> IdentityResult<LoginChallenge> {
        validate_user_id(user)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let phase = if self.store.is_registered(user) {
            LoginPhase::ExistingUserChallenged
        } else {
            LoginPhase::NewUserRegistering
        };

        info!(user_id = %user, phase = phase.name(), "Login challenge issued");
        Ok(LoginChallenge {
            user: user.to_string(),
            nonce,
            phase,
        })
    }

    /// Checks `response` against `challenge`, registering a new user on
    /// success. Returns the authenticated user id.
    ///
    /// Runs under one global lock, and the registration state is read again
    /// inside it: of two concurrent first logins for the same id, only one
    /// can register.
    pub fn complete(&self, challenge: LoginChallenge, response: LoginResponse) -> IdentityResult<UserId> {
        let _guard = self.login_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.check(&challenge, response);

        match &result {
            Ok(()) => info!(user_id = %challenge.user, "Login succeeded"),
            Err(e) => warn!(user_id = %challenge.user, error = %e, "Login rejected"),
        }
        result.map(|()| challenge.user)
    }

    fn check(&self, challenge: &LoginChallenge, response: LoginResponse) -> IdentityResult<()> {
        let user = &challenge.user;
        let registered = self.store.is_registered(user);

        match (challenge.phase, response) {
            (
                LoginPhase::NewUserRegistering,
                LoginResponse::Register {
                    nonce,
                    signature,
                    certificate,
                },
            ) => {
                if registered {
                    return Err(AuthenticationError::AlreadyRegistered { user: user.clone() }.into());
                }
                if nonce.as_slice() != challenge.nonce.as_slice() {
                    return Err(AuthenticationError::NonceMismatch { user: user.clone() }.into());
                }
                if certificate.subject != *user {
                    return Err(AuthenticationError::SubjectMismatch {
                        user: user.clone(),
                        subject: certificate.subject.clone(),
                    }
                    .into());
                }
                let key = certificate.public_key().map_err(|e| {
                    IdentityError::from(AuthenticationError::InvalidCertificate {
                        user: user.clone(),
                        reason: e.to_string(),
                    })
                })?;
                if !verify(&key, &challenge.nonce, &signature) {
                    return Err(AuthenticationError::BadSignature { user: user.clone() }.into());
                }
                self.store.register(user, certificate)?;
                info!(user_id = %user, "New user registered");
                Ok(())
            }
            (LoginPhase::ExistingUserChallenged, LoginResponse::Challenge { signature }) => {
                let key = self
                    .store
                    .public_key(user)?
                    .ok_or_else(|| AuthenticationError::UnknownUser { user: user.clone() })?;
                if !verify(&key, &challenge.nonce, &signature) {
                    return Err(AuthenticationError::BadSignature { user: user.clone() }.into());
                }
                Ok(())
            }
            (phase, _) => Err(AuthenticationError::PhaseMismatch {
                user: user.clone(),
                expected: phase.name(),
            }
            .into()),
        }
    }
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
