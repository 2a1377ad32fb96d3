//! On-disk catalog state touched by trades.
//!
//! Three files in the catalog directory:
//!
//! - `wines.json`: known wine ids
//! - `wallets.json`: user id to balance
//! - `listings.json`: wine id to seller to listing
//!
//! Each file holds a single line: the JSON document encrypted under the
//! server's file key. Writes replace the file atomically and then refresh
//! its manifest entry; if the manifest cannot be updated the previous file
//! contents are put back.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

use cellar_core::fs::write_atomic;
use cellar_core::{Price, UserId};
use cellar_crypto::{decrypt_line, encrypt_line, FileKey};
use cellar_integrity::IntegrityManifest;

use crate::error::TradeResult;

pub const WINES_FILE: &str = "wines.json";
pub const WALLETS_FILE: &str = "wallets.json";
pub const LISTINGS_FILE: &str = "listings.json";

/// Units a seller offers for one wine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub unit_price: Price,
    pub quantity: u32,
}

pub type Wallets = BTreeMap<UserId, Price>;
pub type Listings = BTreeMap<String, BTreeMap<UserId, Listing>>;

/// In-memory copy of the catalog files.
pub struct Catalog {
    dir: PathBuf,
    manifest: Arc<IntegrityManifest>,
    key: FileKey,
    wines: BTreeSet<String>,
    wallets: Wallets,
    listings: Listings,
}

impl Catalog {
    /// Verifies the three files against the manifest and loads them. Missing
    /// files start empty.
    pub fn open(
        dir: impl Into<PathBuf>,
        manifest: Arc<IntegrityManifest>,
        key: FileKey,
    ) -> TradeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        manifest.verify_all(&[
            dir.join(WINES_FILE),
            dir.join(WALLETS_FILE),
            dir.join(LISTINGS_FILE),
        ])?;

        let catalog = Self {
            wines: load(&dir.join(WINES_FILE), &key)?,
            wallets: load(&dir.join(WALLETS_FILE), &key)?,
            listings: load(&dir.join(LISTINGS_FILE), &key)?,
            dir,
            manifest,
            key,
        };
        debug!(
            wines = catalog.wines.len(),
            wallets = catalog.wallets.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn wines(&self) -> &BTreeSet<String> {
        &self.wines
    }

    pub fn wallets(&self) -> &Wallets {
        &self.wallets
    }

    pub fn listings(&self) -> &Listings {
        &self.listings
    }

    pub fn listing(&self, wine: &str, seller: &str) -> Option<Listing> {
        self.listings.get(wine).and_then(|l| l.get(seller)).copied()
    }

    pub(crate) fn set_wines(&mut self, wines: BTreeSet<String>) -> TradeResult<()> {
        self.persist(WINES_FILE, &wines)?;
        self.wines = wines;
        Ok(())
    }

    pub(crate) fn set_wallets(&mut self, wallets: Wallets) -> TradeResult<()> {
        self.persist(WALLETS_FILE, &wallets)?;
        self.wallets = wallets;
        Ok(())
    }

    pub(crate) fn set_listings(&mut self, listings: Listings) -> TradeResult<()> {
        self.persist(LISTINGS_FILE, &listings)?;
        self.listings = listings;
        Ok(())
    }

    /// Writes wallets and listings together. If the listings cannot be
    /// written, the wallets file is restored to its previous state.
    pub(crate) fn set_wallets_and_listings(
        &mut self,
        wallets: Wallets,
        listings: Listings,
    ) -> TradeResult<()> {
        self.persist(WALLETS_FILE, &wallets)?;
        if let Err(e) = self.persist(LISTINGS_FILE, &listings) {
            if let Err(restore) = self.persist(WALLETS_FILE, &self.wallets) {
                error!(error = %restore, "Could not restore wallets after failed listings write");
            }
            return Err(e);
        }
        self.wallets = wallets;
        self.listings = listings;
        Ok(())
    }

    fn persist<T: Serialize>(&self, name: &str, value: &T) -> TradeResult<()> {
        let path = self.dir.join(name);
        let line = encrypt_line(&self.key, &serde_json::to_string(value)?)?;
        let previous = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        write_atomic(&path, format!("{}\n", line).as_bytes())?;
        if let Err(e) = self.manifest.update(&path) {
            let restored = match &previous {
                Some(bytes) => write_atomic(&path, bytes),
                None => fs::remove_file(&path),
            };
            if let Err(restore) = restored {
                error!(file = %name, error = %restore, "Could not restore catalog file");
            }
            return Err(e.into());
        }
        debug!(file = %name, "Catalog file written");
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("dir", &self.dir)
            .field("wines", &self.wines.len())
            .field("wallets", &self.wallets.len())
            .finish_non_exhaustive()
    }
}

fn load<T: DeserializeOwned + Default>(path: &Path, key: &FileKey) -> TradeResult<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    let json = decrypt_line(key, text.trim())?;
    Ok(serde_json::from_str(&json)?)
}
