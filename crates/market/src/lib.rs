//! Wine trading on top of the trust core.
//!
//! [`TradeService`] is the transaction handler between the network layer and
//! the ledger: it validates each sell or buy against the catalog, records it
//! in the ledger (which checks the signature against the user's registered
//! certificate) and only then applies it to the catalog (wallets and
//! listings). Every catalog file is encrypted and integrity-tracked.

pub mod catalog;
pub mod error;
pub mod trade;

pub use catalog::{Catalog, Listing};
pub use error::{DomainError, TradeError, TradeResult};
pub use trade::TradeService;
