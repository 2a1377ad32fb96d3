//! Login scenarios

use cellar_identity::{AuthenticationError, IdentityError, LoginPhase, LoginResponse};
use tempfile::tempdir;

use crate::test_utils::{price, TestClient, TestServer};

#[test]
fn alice_registers_then_logs_in_with_same_certificate() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(dir.path()).unwrap();
    let alice = TestClient::new("alice");

    let challenge = server.gate.begin("alice").unwrap();
    assert!(challenge.is_new_user());
    let reply = LoginResponse::answer(&challenge, &alice.key, &alice.certificate).unwrap();
    assert_eq!(server.gate.complete(challenge, reply).unwrap(), "alice");
    assert_eq!(server.trade.register_user("alice").unwrap(), price("200.00"));

    let challenge = server.gate.begin("alice").unwrap();
    assert_eq!(challenge.phase(), LoginPhase::ExistingUserChallenged);
    let reply = LoginResponse::answer(&challenge, &alice.key, &alice.certificate).unwrap();
    assert_eq!(server.gate.complete(challenge, reply).unwrap(), "alice");
}

#[test]
fn signature_under_a_different_key_is_rejected() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(dir.path()).unwrap();
    let alice = TestClient::new("alice");
    alice.login(&server).unwrap();

    let mallory = TestClient::new("alice");
    let challenge = server.gate.begin("alice").unwrap();
    let reply = LoginResponse::answer(&challenge, &mallory.key, &mallory.certificate).unwrap();
    assert!(matches!(
        server.gate.complete(challenge, reply),
        Err(IdentityError::Authentication(AuthenticationError::BadSignature { .. }))
    ));

    // A replayed reply to an old nonce is useless as well.
    let old = server.gate.begin("alice").unwrap();
    let replayed = LoginResponse::answer(&old, &alice.key, &alice.certificate).unwrap();
    let fresh = server.gate.begin("alice").unwrap();
    assert_ne!(old.nonce(), fresh.nonce());
    assert!(server.gate.complete(fresh, replayed).is_err());
}

#[test]
fn registration_survives_restart() {
    let dir = tempdir().unwrap();
    let alice = TestClient::new("alice");
    {
        let server = TestServer::start(dir.path()).unwrap();
        alice.login(&server).unwrap();
    }

    let server = TestServer::start(dir.path()).unwrap();
    assert!(server.certificates.is_registered("alice"));
    assert_eq!(alice.login(&server).unwrap(), "alice");
    assert_eq!(server.trade.wallet("alice").unwrap(), price("200.00"));
}
