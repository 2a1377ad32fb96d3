//! User identity and login for the Cellar marketplace.
//!
//! Users are identified by a self-signed certificate captured the first time
//! they log in. From then on that certificate is the trust anchor for the
//! user id: later logins and every signed trade request are verified against
//! it, and a client can never replace it.
//!
//! # Login Protocol
//!
//! 1. The client claims a user id; the server answers with a fresh random
//!    nonce and whether the id is new ([`AuthenticationGate::begin`]).
//! 2. A new user echoes the nonce, signs it and submits a certificate. An
//!    existing user only signs the nonce.
//! 3. [`AuthenticationGate::complete`] checks the reply and, for a new user,
//!    records the certificate.
//!
//! Any mismatch is an [`AuthenticationError`]; the caller reports failure and
//! closes the connection.

pub mod auth;
pub mod certificate;
pub mod error;
pub mod store;

pub use auth::{AuthenticationGate, LoginChallenge, LoginPhase, LoginResponse, NONCE_LEN};
pub use certificate::Certificate;
pub use error::{AuthenticationError, IdentityError, IdentityResult};
pub use store::{validate_user_id, CertificateStore};
