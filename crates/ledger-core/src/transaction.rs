//! Value-transfer records.
//!
//! A transaction's `id` is the hex SHA-256 of its canonical message
//! `from|to|amount|kind|created_at`, and the signature covers the raw bytes of
//! that same digest. Fields are private so neither can drift from the
//! contents once the transaction is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, Keypair};
use crate::error::{LedgerError, Result};
use crate::{logical_now, sha256, Hash};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    #[default]
    Transfer,
    Mint,
    Burn,
    Reward,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "transfer",
            TxKind::Mint => "mint",
            TxKind::Burn => "burn",
            TxKind::Reward => "reward",
        }
    }

    /// Transfers and burns move existing funds and so need a signing sender.
    /// Only mints and rewards are issued by the ledger itself.
    pub fn requires_sender(&self) -> bool {
        matches!(self, TxKind::Transfer | TxKind::Burn)
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TransactionRecord")]
pub struct Transaction {
    id: String,
    from_address: Option<String>,
    to_address: String,
    amount: u64,
    kind: TxKind,
    created_at: u64,
    signature: Option<String>,
}

/// Wire form accepted on deserialization; `id` is recomputed and, when
/// supplied, must agree with the contents.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from_address: Option<String>,
    to_address: String,
    amount: u64,
    #[serde(default)]
    kind: TxKind,
    created_at: u64,
    #[serde(default)]
    signature: Option<String>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = String;

    fn try_from(record: TransactionRecord) -> std::result::Result<Self, Self::Error> {
        if record.from_address.is_none() && record.signature.is_some() {
            return Err("signature present on a transaction without fromAddress".to_string());
        }
        let mut tx = Transaction::new_at(
            record.from_address,
            record.to_address,
            record.amount,
            record.kind,
            record.created_at,
        );
        if let Some(id) = record.id {
            if id != tx.id {
                return Err(format!("transaction id {id} does not match its contents"));
            }
        }
        tx.signature = record.signature;
        Ok(tx)
    }
}

impl Transaction {
    pub fn new(
        from_address: Option<String>,
        to_address: impl Into<String>,
        amount: u64,
        kind: TxKind,
    ) -> Self {
        Self::new_at(from_address, to_address, amount, kind, logical_now())
    }

    pub fn new_at(
        from_address: Option<String>,
        to_address: impl Into<String>,
        amount: u64,
        kind: TxKind,
        created_at: u64,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            from_address,
            to_address: to_address.into(),
            amount,
            kind,
            created_at,
            signature: None,
        };
        tx.id = hex::encode(tx.digest());
        tx
    }

    pub fn transfer(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self::new(Some(from.into()), to, amount, TxKind::Transfer)
    }

    pub fn mint(to: impl Into<String>, amount: u64) -> Self {
        Self::new(None, to, amount, TxKind::Mint)
    }

    pub fn reward(to: impl Into<String>, amount: u64) -> Self {
        Self::new(None, to, amount, TxKind::Reward)
    }

    /// Destroys `amount` held by `from`. The recipient field carries the
    /// sender, nothing is credited.
    pub fn burn(from: impl Into<String>, amount: u64) -> Self {
        let from = from.into();
        Self::new(Some(from.clone()), from, amount, TxKind::Burn)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from_address.as_deref()
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Issued by the ledger itself rather than by a key holder.
    pub fn is_system(&self) -> bool {
        self.from_address.is_none()
    }

    pub fn canonical_message(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.from_address.as_deref().unwrap_or(""),
            self.to_address,
            self.amount,
            self.kind.as_str(),
            self.created_at
        )
    }

    pub fn digest(&self) -> Hash {
        sha256(self.canonical_message().as_bytes())
    }

    /// Merkle leaf for block hashing: contents plus signature.
    pub fn leaf_hash(&self) -> Hash {
        let message = format!(
            "{}|{}",
            self.canonical_message(),
            self.signature.as_deref().unwrap_or("")
        );
        sha256(message.as_bytes())
    }

    pub fn sign(&mut self, keys: &Keypair) -> Result<()> {
        let Some(from) = self.from_address.as_deref() else {
            return Ok(());
        };
        if keys.address() != from {
            return Err(LedgerError::SigningError(
                "key pair does not belong to the sending address".to_string(),
            ));
        }
        self.signature = Some(keys.sign_digest(&self.digest())?);
        Ok(())
    }

    pub fn verify(&self) -> Result<bool> {
        let Some(from) = self.from_address.as_deref() else {
            if self.kind.requires_sender() {
                return Err(LedgerError::MissingSender(self.kind));
            }
            return Ok(true);
        };
        match self.signature.as_deref() {
            None | Some("") => Err(LedgerError::MissingSignature),
            Some(signature) => Ok(crypto::verify_digest(from, &self.digest(), signature)),
        }
    }
}

/// Parse a caller-supplied amount. Negative, fractional and non-numeric
/// input is rejected before any transaction is built.
pub fn parse_amount(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    raw.parse::<u64>()
        .map_err(|_| LedgerError::InvalidAmount(raw.to_string()))
}

pub fn amount_from_i64(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| LedgerError::InvalidAmount(raw.to_string()))
}
