//! Sell and buy handling.
//!
//! Each trade runs under the catalog lock in three steps: validate against
//! the catalog and compute the new catalog state in memory, record the
//! transaction in the ledger (which checks the client signature), then
//! persist the catalog change. A rejected signature or a failed ledger write
//! leaves the catalog untouched.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use cellar_core::{MarketConfig, Price, UserId};
use cellar_crypto::{FileKey, PublicKey};
use cellar_identity::CertificateStore;
use cellar_integrity::IntegrityManifest;
use cellar_ledger::{Ledger, LedgerError, Transaction};

use crate::catalog::{Catalog, Listing, Wallets};
use crate::error::{DomainError, TradeError, TradeResult};

/// The transaction handler shared by every client connection.
pub struct TradeService {
    catalog: Mutex<Catalog>,
    ledger: Arc<Ledger>,
    certificates: Arc<CertificateStore>,
    initial_balance: Price,
}

impl TradeService {
    /// Opens the catalog in `catalog_dir`. Its files are encrypted under
    /// `file_key` and tracked by `manifest`.
    pub fn open(
        catalog_dir: impl Into<PathBuf>,
        manifest: Arc<IntegrityManifest>,
        file_key: FileKey,
        ledger: Arc<Ledger>,
        certificates: Arc<CertificateStore>,
        config: &MarketConfig,
    ) -> TradeResult<Self> {
        let catalog = Catalog::open(catalog_dir, manifest, file_key)?;
        Ok(Self {
            catalog: Mutex::new(catalog),
            ledger,
            certificates,
            initial_balance: config.initial_balance,
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn certificates(&self) -> &Arc<CertificateStore> {
        &self.certificates
    }

    /// Opens a wallet for a freshly authenticated user. Returns the current
    /// balance; calling it again for the same user changes nothing.
    pub fn register_user(&self, user: &str) -> TradeResult<Price> {
        self.require_certificate(user)?;
        let mut catalog = self.lock();
        if let Some(balance) = catalog.wallets().get(user) {
            return Ok(*balance);
        }

        let mut wallets = catalog.wallets().clone();
        wallets.insert(user.to_string(), self.initial_balance);
        catalog.set_wallets(wallets)?;
        info!(user_id = %user, balance = %self.initial_balance, "Wallet opened");
        Ok(self.initial_balance)
    }

    /// Adds `wine` to the catalog. Returns `false` if it was already known.
    pub fn add_wine(&self, wine: &str) -> TradeResult<bool> {
        if wine.is_empty() || wine.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidWineId(wine.to_string()).into());
        }
        let mut catalog = self.lock();
        if catalog.wines().contains(wine) {
            return Ok(false);
        }
        let mut wines = catalog.wines().clone();
        wines.insert(wine.to_string());
        catalog.set_wines(wines)?;
        info!(wine = %wine, "Wine added");
        Ok(true)
    }

    /// Lists `quantity` units of `wine` at `unit_price`. An existing listing
    /// by the same seller is topped up and takes the new price.
    ///
    /// `signature` must cover [`Transaction::sell_payload`]. Returns the
    /// ordinal of the ledger block the sale was recorded in.
    pub fn sell(
        &self,
        user: &str,
        wine: &str,
        unit_price: Price,
        quantity: u32,
        signature: Vec<u8>,
    ) -> TradeResult<u64> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity.into());
        }
        let mut catalog = self.lock();
        if !catalog.wines().contains(wine) {
            return Err(DomainError::WineNotFound(wine.to_string()).into());
        }
        self.require_certificate(user)?;
        let tx = Transaction::sell(wine, quantity, unit_price, user, signature)?;

        let mut listings = catalog.listings().clone();
        let listing = listings
            .entry(wine.to_string())
            .or_default()
            .entry(user.to_string())
            .or_insert(Listing {
                unit_price,
                quantity: 0,
            });
        listing.quantity = listing
            .quantity
            .checked_add(quantity)
            .ok_or(DomainError::AmountOverflow)?;
        listing.unit_price = unit_price;
        let stock = listing.quantity;

        let ordinal = self.record(tx)?;
        if let Err(e) = catalog.set_listings(listings) {
            error!(user_id = %user, wine = %wine, block = ordinal, error = %e, "Sell recorded but catalog write failed");
            return Err(e);
        }
        info!(
            user_id = %user,
            wine = %wine,
            quantity,
            unit_price = %unit_price,
            stock,
            block = ordinal,
            "Sell recorded"
        );
        Ok(ordinal)
    }

    /// Buys `quantity` units of `wine` from `seller` at the listed price.
    ///
    /// `signature` must cover [`Transaction::buy_payload`], with the seller
    /// as counterparty. Returns the ordinal of the ledger block the purchase
    /// was recorded in.
    pub fn buy(
        &self,
        buyer: &str,
        wine: &str,
        seller: &str,
        quantity: u32,
        signature: Vec<u8>,
    ) -> TradeResult<u64> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity.into());
        }
        let mut catalog = self.lock();
        if !catalog.wines().contains(wine) {
            return Err(DomainError::WineNotFound(wine.to_string()).into());
        }
        self.require_certificate(buyer)?;
        self.require_certificate(seller)?;

        let listing = catalog
            .listing(wine, seller)
            .ok_or_else(|| DomainError::ListingNotFound {
                wine: wine.to_string(),
                seller: seller.to_string(),
            })?;
        if listing.quantity < quantity {
            return Err(DomainError::InsufficientStock {
                wine: wine.to_string(),
                seller: seller.to_string(),
                available: listing.quantity,
                requested: quantity,
            }
            .into());
        }

        let total = listing
            .unit_price
            .checked_mul(quantity)
            .map_err(|_| DomainError::AmountOverflow)?;
        let balance = wallet_of(catalog.wallets(), buyer)?;
        if balance < total {
            return Err(DomainError::InsufficientBalance {
                user: buyer.to_string(),
                balance,
                required: total,
            }
            .into());
        }
        wallet_of(catalog.wallets(), seller)?;

        let tx = Transaction::buy(wine, quantity, listing.unit_price, buyer, seller, signature)?;

        let mut wallets = catalog.wallets().clone();
        let debited = balance
            .checked_sub(total)
            .map_err(|_| DomainError::AmountOverflow)?;
        wallets.insert(buyer.to_string(), debited);
        let credited = wallet_of(&wallets, seller)?
            .checked_add(total)
            .map_err(|_| DomainError::AmountOverflow)?;
        wallets.insert(seller.to_string(), credited);

        let mut listings = catalog.listings().clone();
        let remaining = listing.quantity - quantity;
        if let Some(by_seller) = listings.get_mut(wine) {
            if remaining == 0 {
                by_seller.remove(seller);
            } else if let Some(entry) = by_seller.get_mut(seller) {
                entry.quantity = remaining;
            }
            if by_seller.is_empty() {
                listings.remove(wine);
            }
        }

        let ordinal = self.record(tx)?;
        if let Err(e) = catalog.set_wallets_and_listings(wallets, listings) {
            error!(buyer = %buyer, wine = %wine, block = ordinal, error = %e, "Buy recorded but catalog write failed");
            return Err(e);
        }
        info!(
            buyer = %buyer,
            seller = %seller,
            wine = %wine,
            quantity,
            total = %total,
            remaining,
            block = ordinal,
            "Buy recorded"
        );
        Ok(ordinal)
    }

    pub fn wallet(&self, user: &str) -> TradeResult<Price> {
        wallet_of(self.lock().wallets(), user)
    }

    /// Units of `wine` currently offered by `seller` (0 when none).
    pub fn stock(&self, wine: &str, seller: &str) -> TradeResult<u32> {
        let catalog = self.lock();
        if !catalog.wines().contains(wine) {
            return Err(DomainError::WineNotFound(wine.to_string()).into());
        }
        Ok(catalog.listing(wine, seller).map_or(0, |l| l.quantity))
    }

    /// Every listing for `wine`, by seller.
    pub fn listings(&self, wine: &str) -> TradeResult<Vec<(UserId, Listing)>> {
        let catalog = self.lock();
        if !catalog.wines().contains(wine) {
            return Err(DomainError::WineNotFound(wine.to_string()).into());
        }
        Ok(catalog
            .listings()
            .get(wine)
            .map(|by_seller| by_seller.iter().map(|(s, l)| (s.clone(), *l)).collect())
            .unwrap_or_default())
    }

    /// The ledger audit trail.
    pub fn list_transactions(&self) -> TradeResult<String> {
        Ok(self.ledger.list_all_transactions()?)
    }

    /// Appends `tx` to the ledger, which verifies it against the acting
    /// user's registered key first.
    fn record(&self, tx: Transaction) -> TradeResult<u64> {
        let lookup = |user: &str| self.certificates.public_key(user).ok().flatten();
        match self.ledger.add_transaction(tx, lookup) {
            Ok(ordinal) => Ok(ordinal),
            Err(LedgerError::InvalidSignature { user }) => {
                warn!(user_id = %user, "Trade rejected: bad signature");
                Err(TradeError::InvalidSignature { user })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn require_certificate(&self, user: &str) -> TradeResult<PublicKey> {
        self.certificates
            .public_key(user)?
            .ok_or_else(|| DomainError::UserNotFound(user.to_string()).into())
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn wallet_of(wallets: &Wallets, user: &str) -> TradeResult<Price> {
    wallets
        .get(user)
        .copied()
        .ok_or_else(|| DomainError::UserNotFound(user.to_string()).into())
}
