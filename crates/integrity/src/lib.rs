//! Cellar Integrity
//!
//! Tamper detection for the on-disk catalog. A single encrypted manifest maps
//! every tracked file name to a keyed digest of its contents; the server
//! refuses to start when a live file no longer matches its entry.

#![warn(missing_docs)]

pub mod error;
pub mod manifest;

pub use error::{IntegrityError, IntegrityResult};
pub use manifest::IntegrityManifest;
