//! Signed trade records.
//!
//! The bytes a client signs depend on the kind of trade:
//!
//! | Kind | Canonical payload |
//! |------|-------------------|
//! | Sell | `{wine}{quantity}{unit price, 2 decimals}` |
//! | Buy  | `{wine}{quantity}{seller}` |
//!
//! The two forms differ on purpose and are part of the client protocol.
//! [`Transaction::canonical_payload`] is the single place that decides which
//! one applies.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

use cellar_core::{Price, UserId};
use cellar_crypto::{verify, PublicKey};

use crate::error::{LedgerError, LedgerResult};

/// What happened, plus the fields only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// The acting user listed units for sale.
    Sell,
    /// The acting user bought units from `seller`.
    Buy { seller: UserId },
}

/// One buy or sell event with the issuing user's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    kind: TransactionKind,
    wine: String,
    quantity: u32,
    unit_price: Price,
    user: UserId,
    #[serde(with = "signature_base64")]
    signature: Vec<u8>,
}

impl Transaction {
    /// A sell of `quantity` units of `wine` at `unit_price` by `user`.
    pub fn sell(
        wine: impl Into<String>,
        quantity: u32,
        unit_price: Price,
        user: impl Into<UserId>,
        signature: Vec<u8>,
    ) -> LedgerResult<Self> {
        let tx = Self {
            kind: TransactionKind::Sell,
            wine: wine.into(),
            quantity,
            unit_price,
            user: user.into(),
            signature,
        };
        tx.validate()?;
        Ok(tx)
    }

    /// A buy by `user` from `seller`. `unit_price` is the listing price the
    /// trade settled at; it is recorded but not part of the signed payload.
    pub fn buy(
        wine: impl Into<String>,
        quantity: u32,
        unit_price: Price,
        user: impl Into<UserId>,
        seller: impl Into<UserId>,
        signature: Vec<u8>,
    ) -> LedgerResult<Self> {
        let tx = Self {
            kind: TransactionKind::Buy {
                seller: seller.into(),
            },
            wine: wine.into(),
            quantity,
            unit_price,
            user: user.into(),
            signature,
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Bytes a client signs to request a sell.
    pub fn sell_payload(wine: &str, quantity: u32, unit_price: Price) -> Vec<u8> {
        format!("{}{}{}", wine, quantity, unit_price).into_bytes()
    }

    /// Bytes a client signs to request a buy.
    pub fn buy_payload(wine: &str, quantity: u32, seller: &str) -> Vec<u8> {
        format!("{}{}{}", wine, quantity, seller).into_bytes()
    }

    /// The exact bytes the signature must cover for this transaction.
    pub fn canonical_payload(&self) -> Vec<u8> {
        match &self.kind {
            TransactionKind::Sell => Self::sell_payload(&self.wine, self.quantity, self.unit_price),
            TransactionKind::Buy { seller } => Self::buy_payload(&self.wine, self.quantity, seller),
        }
    }

    /// Whether the embedded signature was made over the canonical payload by
    /// the holder of `public_key`.
    pub fn is_signature_valid(&self, public_key: &PublicKey) -> bool {
        verify(public_key, &self.canonical_payload(), &self.signature)
    }

    /// Structural checks shared by the constructors and block loading.
    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if self.wine.is_empty() {
            return Err(LedgerError::InvalidTransaction("wine id is empty".into()));
        }
        if self.user.is_empty() {
            return Err(LedgerError::InvalidTransaction("user id is empty".into()));
        }
        if self.quantity == 0 {
            return Err(LedgerError::InvalidTransaction(
                "quantity must be positive".into(),
            ));
        }
        if let TransactionKind::Buy { seller } = &self.kind {
            if seller.is_empty() {
                return Err(LedgerError::InvalidTransaction("seller id is empty".into()));
            }
        }
        if self.signature.is_empty() {
            return Err(LedgerError::InvalidTransaction("signature is empty".into()));
        }
        Ok(())
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    pub fn wine(&self) -> &str {
        &self.wine
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Price {
        self.unit_price
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Deterministic one-line rendering. Block content hashes are computed over
/// it, so the format is frozen.
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TransactionKind::Sell => write!(
                f,
                "SELL wine={} quantity={} unit_price={} user={}",
                self.wine, self.quantity, self.unit_price, self.user
            )?,
            TransactionKind::Buy { seller } => write!(
                f,
                "BUY wine={} quantity={} unit_price={} user={} seller={}",
                self.wine, self.quantity, self.unit_price, self.user, seller
            )?,
        }
        write!(f, " signature={}", BASE64.encode(&self.signature))
    }
}

mod signature_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BASE64.decode(raw).map_err(serde::de::Error::custom)
    }
}
