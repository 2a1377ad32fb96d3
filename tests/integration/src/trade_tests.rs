//! Trading scenarios

use cellar_ledger::TransactionKind;
use cellar_market::{DomainError, TradeError};
use tempfile::tempdir;

use crate::test_utils::{price, TestClient, TestServer};

fn seeded() -> (tempfile::TempDir, TestServer, TestClient, TestClient) {
    let dir = tempdir().unwrap();
    let server = TestServer::start(dir.path()).unwrap();
    let bob = TestClient::new("bob");
    let alice = TestClient::new("alice");
    bob.login(&server).unwrap();
    alice.login(&server).unwrap();
    server.trade.add_wine("Douro2020").unwrap();
    (dir, server, bob, alice)
}

#[test]
fn bob_sells_alice_buys() {
    let (_dir, server, bob, alice) = seeded();

    bob.sell(&server, "Douro2020", price("12.50"), 10).unwrap();
    let block = alice.buy(&server, "Douro2020", "bob", 4).unwrap();

    assert_eq!(server.trade.wallet("alice").unwrap(), price("150.00"));
    assert_eq!(server.trade.wallet("bob").unwrap(), price("250.00"));
    assert_eq!(server.trade.stock("Douro2020", "bob").unwrap(), 6);

    assert_eq!(block, server.ledger.open_block_ordinal());
    let open = server.ledger.store().load(block).unwrap();
    let last = open.transactions().last().unwrap();
    assert_eq!(last.user(), "alice");
    assert_eq!(last.quantity(), 4);
    assert_eq!(last.kind(), &TransactionKind::Buy { seller: "bob".into() });
}

#[test]
fn buy_with_mismatched_canonical_string_is_rejected() {
    let (_dir, server, bob, alice) = seeded();
    bob.sell(&server, "Douro2020", price("12.50"), 10).unwrap();

    // alice signs a buy of 3 but submits 4.
    let signature = cellar_crypto::sign(
        &alice.key,
        &cellar_ledger::Transaction::buy_payload("Douro2020", 3, "bob"),
    )
    .unwrap();
    let err = server
        .trade
        .buy("alice", "Douro2020", "bob", 4, signature)
        .unwrap_err();

    assert!(matches!(err, TradeError::InvalidSignature { .. }));
    assert_eq!(server.trade.wallet("alice").unwrap(), price("200.00"));
    assert_eq!(server.trade.wallet("bob").unwrap(), price("200.00"));
    assert_eq!(server.trade.stock("Douro2020", "bob").unwrap(), 10);
    assert_eq!(server.ledger.transactions().unwrap().len(), 1);
}

#[test]
fn fifth_transaction_seals_block_on_disk() {
    let (_dir, server, bob, alice) = seeded();
    bob.sell(&server, "Douro2020", price("1.00"), 20).unwrap();
    for _ in 0..3 {
        alice.buy(&server, "Douro2020", "bob", 1).unwrap();
    }
    assert!(!server.block_path(2).exists());

    alice.buy(&server, "Douro2020", "bob", 1).unwrap();

    let first: serde_json::Value =
        serde_json::from_slice(&std::fs::read(server.block_path(1)).unwrap()).unwrap();
    let second: serde_json::Value =
        serde_json::from_slice(&std::fs::read(server.block_path(2)).unwrap()).unwrap();
    assert_eq!(first["transaction_count"], 5);
    assert!(first["signature"].is_string());
    assert_eq!(second["transaction_count"], 0);

    let sealed = server.ledger.store().load(1).unwrap();
    assert_eq!(
        second["previous_hash"].as_str().unwrap(),
        sealed
            .content_hash()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    );
}

#[test]
fn domain_errors_keep_the_session_usable() {
    let (_dir, server, bob, alice) = seeded();
    bob.sell(&server, "Douro2020", price("100.00"), 5).unwrap();

    let err = alice.buy(&server, "Douro2020", "bob", 3).unwrap_err();
    assert!(matches!(err, TradeError::Domain(DomainError::InsufficientBalance { .. })));
    assert!(err.is_recoverable());

    let err = alice.buy(&server, "Douro2020", "bob", 6).unwrap_err();
    assert!(matches!(err, TradeError::Domain(DomainError::InsufficientStock { .. })));

    alice.buy(&server, "Douro2020", "bob", 2).unwrap();
    assert_eq!(server.trade.wallet("alice").unwrap(), price("0.00"));
}

#[test]
fn audit_listing_shows_chain_in_order() {
    let (_dir, server, bob, alice) = seeded();
    bob.sell(&server, "Douro2020", price("2.00"), 10).unwrap();
    for _ in 0..5 {
        alice.buy(&server, "Douro2020", "bob", 1).unwrap();
    }

    let listing = server.trade.list_transactions().unwrap();
    let first = listing.find("Block 1").unwrap();
    let second = listing.find("Block 2").unwrap();
    assert!(first < second);
    assert!(listing.contains("SELL wine=Douro2020 quantity=10 unit_price=2.00 user=bob"));
    assert_eq!(listing.matches("BUY wine=Douro2020").count(), 5);
}
