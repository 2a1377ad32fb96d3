//! End-to-end tests across the trust core
//!
//! This test suite validates:
//! - First login registration and later challenge logins
//! - Signed sells and buys settling wallets, stock and the ledger
//! - Block sealing observed through the block files
//! - Startup refusal after out-of-band tampering

pub mod test_utils;

#[cfg(test)]
mod login_tests;

#[cfg(test)]
mod trade_tests;

#[cfg(test)]
mod tamper_tests;
