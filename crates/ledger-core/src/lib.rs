//! Proof-of-work account ledger.
//!
//! Signed [`Transaction`]s are admitted into a pending pool, mined into
//! hash-linked [`Block`]s, and folded into a balance table owned by the
//! [`Ledger`].

pub mod block;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod transaction;

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use block::{Block, BlockDigest};
pub use crypto::Keypair;
pub use error::{IntegrityFault, LedgerError, Result};
pub use ledger::{ChainSummary, Ledger, LedgerConfig, LedgerSnapshot, TransactionLocation};
pub use mine::CancelFlag;
pub use transaction::{Transaction, TxKind};

pub type Hash = [u8; 32];

pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Wall-clock milliseconds, bumped so that no two calls in this process
/// return the same value. Transactions built back to back therefore never
/// share an id.
pub fn logical_now() -> u64 {
    let wall = now_millis();
    let mut prev = LAST_TICK.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match LAST_TICK.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = txs.iter().map(Transaction::leaf_hash).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut joined = [0u8; 64];
            joined[..32].copy_from_slice(&a);
            joined[32..].copy_from_slice(&b);
            next.push(sha256(&joined));
        }
        level = next;
    }
    level[0]
}

pub mod pow {
    use super::Hash;

    /// Number of leading `0` hex digits in the hash.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> usize {
        let mut total = 0;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: usize) -> bool {
        count_leading_zero_nibbles(hash) >= difficulty
    }

    /// Same check against a hex-encoded hash as stored in a block.
    pub fn hex_meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
        hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|b| b == b'0')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_txs() -> Vec<Transaction> {
        vec![
            Transaction::new_at(Some("alice".into()), "bob", 10, TxKind::Transfer, 1_600_000_000),
            Transaction::new_at(Some("bob".into()), "charlie", 5, TxKind::Transfer, 1_600_000_100),
            Transaction::new_at(None, "dave", 2, TxKind::Mint, 1_600_000_200),
        ]
    }

    #[test]
    fn leading_zero_nibble_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::count_leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 1);
        h = [0u8; 32];
        h[1] = 0x80;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 2);
        h[1] = 0x04;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 3);
        h = [0u8; 32];
        h[0] = 0x10;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 0);
    }

    #[test]
    fn nibble_and_hex_checks_agree() {
        let mut h = [0xffu8; 32];
        h[0] = 0x00;
        h[1] = 0x0a;
        let hex = hex::encode(h);
        for difficulty in 0..6 {
            assert_eq!(
                pow::meets_difficulty(&h, difficulty),
                pow::hex_meets_difficulty(&hex, difficulty),
                "difficulty {difficulty}"
            );
        }
        assert!(pow::meets_difficulty(&h, 3));
        assert!(!pow::meets_difficulty(&h, 4));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn merkle_root_empty_txs() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn merkle_root_single_tx() {
        let txs = three_txs();
        assert_eq!(merkle_root(&txs[..1]), txs[0].leaf_hash());
    }

    #[test]
    fn merkle_root_three_txs_duplicates_last() {
        let txs = three_txs();
        let pair = |a: Hash, b: Hash| {
            let mut joined = Vec::with_capacity(64);
            joined.extend_from_slice(&a);
            joined.extend_from_slice(&b);
            sha256(&joined)
        };
        let left = pair(txs[0].leaf_hash(), txs[1].leaf_hash());
        let right = pair(txs[2].leaf_hash(), txs[2].leaf_hash());
        assert_eq!(merkle_root(&txs), pair(left, right));
    }

    #[test]
    fn merkle_root_depends_on_order() {
        let txs = three_txs();
        let mut reversed = txs.clone();
        reversed.reverse();
        assert_ne!(merkle_root(&txs), merkle_root(&reversed));
    }

    #[test]
    fn logical_now_is_strictly_increasing() {
        let mut last = logical_now();
        for _ in 0..1000 {
            let next = logical_now();
            assert!(next > last);
            last = next;
        }
    }
}
