use std::fmt;

use serde::Serialize;

use crate::transaction::TxKind;

/// What went wrong with a block during chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegrityFault {
    InvalidTransactions,
    HashMismatch,
    BrokenLink,
    InsufficientWork,
    BadIndex,
    BadGenesis,
}

impl fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IntegrityFault::InvalidTransactions => "block contains an invalid transaction",
            IntegrityFault::HashMismatch => "stored hash does not match block contents",
            IntegrityFault::BrokenLink => "previous hash does not match the preceding block",
            IntegrityFault::InsufficientWork => "hash does not meet the difficulty target",
            IntegrityFault::BadIndex => "block index does not follow the preceding block",
            IntegrityFault::BadGenesis => "genesis block is malformed",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transaction is not signed")]
    MissingSignature,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("{0} transaction has no sender")]
    MissingSender(TxKind),
    #[error("insufficient balance for {address}: have {balance}, need {required}")]
    InsufficientBalance {
        address: String,
        balance: i128,
        required: u64,
    },
    #[error("transaction {0} is already known")]
    DuplicateTransaction(String),
    #[error("transaction {id} not admitted: {reason}")]
    TransactionNotAdmitted {
        id: String,
        #[source]
        reason: Box<LedgerError>,
    },
    #[error("chain integrity violation at block {index}: {fault}")]
    ChainIntegrityViolation { index: u64, fault: IntegrityFault },
    #[error("signing failed: {0}")]
    SigningError(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("mining cancelled")]
    MiningCancelled,
}

impl LedgerError {
    pub(crate) fn not_admitted(id: &str, reason: LedgerError) -> Self {
        LedgerError::TransactionNotAdmitted {
            id: id.to_string(),
            reason: Box::new(reason),
        }
    }

    /// The underlying cause when a transaction was turned away at the pool.
    pub fn rejection_reason(&self) -> Option<&LedgerError> {
        match self {
            LedgerError::TransactionNotAdmitted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_admitted_exposes_reason() {
        let err = LedgerError::not_admitted("abc", LedgerError::MissingSignature);
        assert!(matches!(
            err.rejection_reason(),
            Some(LedgerError::MissingSignature)
        ));
        assert_eq!(
            err.to_string(),
            "transaction abc not admitted: transaction is not signed"
        );
    }

    #[test]
    fn rejection_reason_is_none_for_other_errors() {
        assert!(LedgerError::MiningCancelled.rejection_reason().is_none());
    }

    #[test]
    fn missing_sender_names_the_kind() {
        assert_eq!(
            LedgerError::MissingSender(TxKind::Burn).to_string(),
            "burn transaction has no sender"
        );
    }

    #[test]
    fn integrity_violation_message() {
        let err = LedgerError::ChainIntegrityViolation {
            index: 3,
            fault: IntegrityFault::BrokenLink,
        };
        assert_eq!(
            err.to_string(),
            "chain integrity violation at block 3: previous hash does not match the preceding block"
        );
    }
}
