//! Core functionality for the Cellar wine marketplace.
//!
//! This crate provides the fundamental types, configuration, logging and
//! file-handling utilities shared by the ledger, integrity, identity and
//! market crates.

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod types;

pub use config::{Config, MarketConfig, ServerConfig, StorageConfig};
pub use error::{CoreError, Result};
pub use types::{Price, PriceError, UserId};
