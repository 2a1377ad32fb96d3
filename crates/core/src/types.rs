//! Core types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// User identifier as claimed at login.
pub type UserId = String;

/// Non-negative monetary amount with exactly two decimal places.
///
/// Held as integer cents so that the `Display` rendering, which is part of the
/// signed canonical payload of a sell, is exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

/// Errors produced when parsing or combining prices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("Invalid price '{0}': expected a non-negative amount with at most two decimals")]
    Invalid(String),

    #[error("Price arithmetic overflow")]
    Overflow,

    #[error("Price arithmetic underflow")]
    Underflow,
}

impl Price {
    pub const ZERO: Price = Price(0);

    pub const fn from_cents(cents: u64) -> Self {
        Price(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Total for `units` items at this unit price.
    pub fn checked_mul(self, units: u32) -> Result<Price, PriceError> {
        self.0
            .checked_mul(u64::from(units))
            .map(Price)
            .ok_or(PriceError::Overflow)
    }

    pub fn checked_add(self, other: Price) -> Result<Price, PriceError> {
        self.0.checked_add(other.0).map(Price).ok_or(PriceError::Overflow)
    }

    pub fn checked_sub(self, other: Price) -> Result<Price, PriceError> {
        self.0.checked_sub(other.0).map(Price).ok_or(PriceError::Underflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PriceError::Invalid(s.to_string());
        let trimmed = s.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if trimmed.contains('.') && fraction.is_empty() {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(cents))
            .map(Price)
            .ok_or(PriceError::Overflow)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
