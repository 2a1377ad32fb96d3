//! Test utilities for end-to-end scenarios

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use cellar_core::{Config, Price};
use cellar_crypto::{sign, FileKey, PrivateKey, ServerKeyPair};
use cellar_identity::{
    AuthenticationGate, Certificate, CertificateStore, IdentityResult, LoginResponse,
};
use cellar_integrity::IntegrityManifest;
use cellar_ledger::{BlockStore, Ledger, Transaction};
use cellar_market::{TradeResult, TradeService};

pub const TEST_PASSPHRASE: &str = "integration-pass";

static TRACING: Once = Once::new();

/// Routes `tracing` output through the test harness once per process.
pub fn init_test_logging() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A server assembled the same way the node does it, over a data directory.
pub struct TestServer {
    pub config: Config,
    pub manifest: Arc<IntegrityManifest>,
    pub certificates: Arc<CertificateStore>,
    pub ledger: Arc<Ledger>,
    pub trade: TradeService,
    pub gate: AuthenticationGate,
}

/// Any startup failure, boxed so tests can inspect the source.
pub type StartError = Box<dyn std::error::Error + Send + Sync>;

impl TestServer {
    pub fn start(data_dir: &Path) -> Result<Self, StartError> {
        Self::start_with(data_dir, TEST_PASSPHRASE)
    }

    pub fn start_with(data_dir: &Path, passphrase: &str) -> Result<Self, StartError> {
        init_test_logging();
        let config = Config::default_config().with_data_dir(data_dir);
        let file_key = FileKey::derive(passphrase);

        let manifest = Arc::new(IntegrityManifest::new(config.manifest_path(), file_key.clone()));
        let keys = ServerKeyPair::load_or_generate(&config.server_key_path(), &file_key)?;
        let certificates = Arc::new(CertificateStore::open(
            config.certificate_dir(),
            config.credentials_path(),
            Arc::clone(&manifest),
        )?);
        let ledger = Arc::new(Ledger::open(BlockStore::open(config.ledger_dir())?, keys)?);
        let trade = TradeService::open(
            config.catalog_dir(),
            Arc::clone(&manifest),
            file_key,
            Arc::clone(&ledger),
            Arc::clone(&certificates),
            &config.market,
        )?;
        let gate = AuthenticationGate::new(Arc::clone(&certificates));

        Ok(Self {
            config,
            manifest,
            certificates,
            ledger,
            trade,
            gate,
        })
    }

    pub fn block_path(&self, ordinal: u64) -> PathBuf {
        self.config.ledger_dir().join(format!("block_{}.blk", ordinal))
    }
}

/// A client holding its own key pair and certificate.
pub struct TestClient {
    pub user: String,
    pub key: PrivateKey,
    pub certificate: Certificate,
}

impl TestClient {
    pub fn new(user: &str) -> Self {
        let key = PrivateKey::generate();
        let certificate = Certificate::self_signed(user, &key).expect("certificate issues");
        Self {
            user: user.to_string(),
            key,
            certificate,
        }
    }

    /// Runs the full login exchange, then opens the user's wallet.
    pub fn login(&self, server: &TestServer) -> IdentityResult<String> {
        let challenge = server.gate.begin(&self.user)?;
        let reply = LoginResponse::answer(&challenge, &self.key, &self.certificate)?;
        let user = server.gate.complete(challenge, reply)?;
        server
            .trade
            .register_user(&user)
            .expect("wallet opens after login");
        Ok(user)
    }

    pub fn sell(&self, server: &TestServer, wine: &str, unit_price: Price, quantity: u32) -> TradeResult<u64> {
        let signature = sign(&self.key, &Transaction::sell_payload(wine, quantity, unit_price))
            .expect("signing succeeds");
        server.trade.sell(&self.user, wine, unit_price, quantity, signature)
    }

    pub fn buy(&self, server: &TestServer, wine: &str, seller: &str, quantity: u32) -> TradeResult<u64> {
        let signature = sign(&self.key, &Transaction::buy_payload(wine, quantity, seller))
            .expect("signing succeeds");
        server.trade.buy(&self.user, wine, seller, quantity, signature)
    }
}

pub fn price(s: &str) -> Price {
    s.parse().expect("valid price")
}
