//! Server startup routine.
//!
//! Builds every shared service exactly once, in dependency order, and hands
//! them out by `Arc`. Any integrity or ledger corruption found on the way
//! aborts startup. The connection layer builds its `AuthenticationGate` over
//! [`Node::certificates`].

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use cellar_core::Config;
use cellar_crypto::{FileKey, ServerKeyPair};
use cellar_identity::CertificateStore;
use cellar_integrity::IntegrityManifest;
use cellar_ledger::{BlockStore, Ledger};
use cellar_market::TradeService;

/// The running server's shared state.
pub struct Node {
    pub certificates: Arc<CertificateStore>,
    pub ledger: Arc<Ledger>,
    pub trade: Arc<TradeService>,
}

impl Node {
    pub fn start(config: &Config, passphrase: &str) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        info!(data_dir = %config.storage.data_dir.display(), "Starting server");

        let file_key = FileKey::derive(passphrase);
        let manifest = Arc::new(IntegrityManifest::new(config.manifest_path(), file_key.clone()));
        let keys = ServerKeyPair::load_or_generate(&config.server_key_path(), &file_key)
            .context("loading server key")?;

        let certificates = Arc::new(
            CertificateStore::open(
                config.certificate_dir(),
                config.credentials_path(),
                Arc::clone(&manifest),
            )
            .context("opening certificate store")?,
        );
        let ledger = Arc::new(
            Ledger::open(BlockStore::open(config.ledger_dir())?, keys).context("ledger bootstrap")?,
        );
        let trade = Arc::new(
            TradeService::open(
                config.catalog_dir(),
                manifest,
                file_key,
                Arc::clone(&ledger),
                Arc::clone(&certificates),
                &config.market,
            )
            .context("opening catalog")?,
        );

        info!("Startup checks passed");
        Ok(Self {
            certificates,
            ledger,
            trade,
        })
    }
}
