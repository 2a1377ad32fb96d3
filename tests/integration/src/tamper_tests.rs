//! Out-of-band tampering between server runs must stop the next start.

use std::fs;
use std::path::Path;

use cellar_crypto::{encrypt_line, FileKey};
use cellar_integrity::IntegrityError;
use cellar_ledger::LedgerError;
use tempfile::tempdir;

use crate::test_utils::{price, StartError, TestClient, TestServer, TEST_PASSPHRASE};

fn run_some_trades(dir: &Path) {
    let server = TestServer::start(dir).unwrap();
    let bob = TestClient::new("bob");
    let alice = TestClient::new("alice");
    bob.login(&server).unwrap();
    alice.login(&server).unwrap();
    server.trade.add_wine("Douro2020").unwrap();
    bob.sell(&server, "Douro2020", price("12.50"), 10).unwrap();
    for _ in 0..5 {
        alice.buy(&server, "Douro2020", "bob", 1).unwrap();
    }
}

fn find_source<'a, E: std::error::Error + 'static>(err: &'a StartError) -> Option<&'a E> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&**err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<E>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn start_error(dir: &Path) -> StartError {
    match TestServer::start(dir) {
        Ok(_) => panic!("server started on tampered data"),
        Err(e) => e,
    }
}

#[test]
fn untouched_data_restarts_cleanly() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    let server = TestServer::start(dir.path()).unwrap();
    assert_eq!(server.ledger.transactions().unwrap().len(), 6);
    assert_eq!(server.trade.wallet("bob").unwrap(), price("262.50"));
}

#[test]
fn catalog_files_do_not_reveal_balances() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    let catalog = dir.path().join("catalog");
    for name in ["wallets.json", "listings.json", "wines.json"] {
        let raw = fs::read_to_string(catalog.join(name)).unwrap();
        assert!(!raw.contains("bob"), "{} is readable", name);
        assert!(!raw.contains("Douro2020"), "{} is readable", name);
    }
    assert!(!fs::read_to_string(catalog.join("wallets.json")).unwrap().contains("262.50"));
}

#[test]
fn edited_wallet_file_is_detected() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    // Well-formed and encrypted under the right key, but not written by the
    // server.
    let wallets = dir.path().join("catalog").join("wallets.json");
    let forged = encrypt_line(
        &FileKey::derive(TEST_PASSPHRASE),
        r#"{"alice":"937.50","bob":"262.50"}"#,
    )
    .unwrap();
    fs::write(&wallets, forged).unwrap();

    let err = start_error(dir.path());
    assert!(matches!(
        find_source::<IntegrityError>(&err),
        Some(IntegrityError::Tampered { .. })
    ));
}

#[test]
fn deleted_listing_file_is_detected() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    fs::remove_file(dir.path().join("catalog").join("listings.json")).unwrap();

    let err = start_error(dir.path());
    assert!(matches!(
        find_source::<IntegrityError>(&err),
        Some(IntegrityError::FileMissing { .. })
    ));
}

#[test]
fn edited_sealed_block_is_detected() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    let block = dir.path().join("blockchain").join("block_1.blk");
    let text = fs::read_to_string(&block).unwrap();
    fs::write(&block, text.replacen("\"quantity\": 10", "\"quantity\": 99", 1)).unwrap();

    let err = start_error(dir.path());
    assert!(matches!(
        find_source::<LedgerError>(&err),
        Some(LedgerError::Corruption { ordinal: 1, .. })
    ));
}

#[test]
fn removed_manifest_is_detected() {
    let dir = tempdir().unwrap();
    run_some_trades(dir.path());
    fs::remove_file(dir.path().join("catalog").join("HMAC.manifest")).unwrap();

    let err = start_error(dir.path());
    assert!(matches!(
        find_source::<IntegrityError>(&err),
        Some(IntegrityError::ManifestMissing { .. })
    ));
}
