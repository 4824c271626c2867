use serde::{Deserialize, Serialize};

use crate::constants::{CANCEL_CHECK_INTERVAL, GENESIS_PREVIOUS_HASH};
use crate::error::{LedgerError, Result};
use crate::mine::CancelFlag;
use crate::transaction::Transaction;
use crate::{logical_now, merkle_root, pow, sha256, Hash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) created_at: u64,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) previous_hash: String,
    pub(crate) nonce: u64,
    pub(crate) hash: String,
}

/// Everything that feeds the block hash except the nonce, with the
/// transactions already folded into their merkle root.
#[derive(Clone, Debug)]
pub(crate) struct HeaderTemplate {
    index: u64,
    created_at: u64,
    merkle_root: Hash,
    previous_hash: String,
}

impl HeaderTemplate {
    pub(crate) fn hash_bytes(&self, nonce: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 32 + self.previous_hash.len() + 8);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.created_at.to_le_bytes());
        bytes.extend_from_slice(&self.merkle_root);
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(&nonce.to_le_bytes());
        bytes
    }

    pub(crate) fn hash_at(&self, nonce: u64) -> Hash {
        sha256(&self.hash_bytes(nonce))
    }
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: impl Into<String>) -> Self {
        Self::new_at(index, transactions, previous_hash, logical_now())
    }

    pub fn new_at(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
        created_at: u64,
    ) -> Self {
        let mut block = Self {
            index,
            created_at,
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// Unmined, transaction-free block at index 0.
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub(crate) fn template(&self) -> HeaderTemplate {
        HeaderTemplate {
            index: self.index,
            created_at: self.created_at,
            merkle_root: merkle_root(&self.transactions),
            previous_hash: self.previous_hash.clone(),
        }
    }

    pub fn recompute_hash(&self) -> String {
        hex::encode(self.template().hash_at(self.nonce))
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.recompute_hash()
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        pow::hex_meets_difficulty(&self.hash, difficulty)
    }

    /// Search nonces upward from the current one until the hash starts with
    /// `difficulty` zero hex digits. Nonce and hash are only written once a
    /// match is found, so a cancelled search leaves the block as it was.
    pub fn mine(&mut self, difficulty: usize, cancel: &CancelFlag) -> Result<()> {
        let template = self.template();
        let mut nonce = self.nonce;
        loop {
            let hash = template.hash_at(nonce);
            if pow::meets_difficulty(&hash, difficulty) {
                self.nonce = nonce;
                self.hash = hex::encode(hash);
                return Ok(());
            }
            nonce = nonce.wrapping_add(1);
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(LedgerError::MiningCancelled);
            }
        }
    }

    pub(crate) fn set_mined(&mut self, nonce: u64, hash: Hash) {
        self.nonce = nonce;
        self.hash = hex::encode(hash);
    }

    /// True iff every transaction verifies. An unsigned user transaction
    /// counts as invalid here rather than as an error.
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions
            .iter()
            .all(|tx| matches!(tx.verify(), Ok(true)))
    }

    pub fn digest(&self) -> BlockDigest {
        BlockDigest {
            index: self.index,
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
            created_at: self.created_at,
            nonce: self.nonce,
            transaction_count: self.transactions.len(),
        }
    }
}

/// Header-level view of a block for summaries and listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDigest {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub created_at: u64,
    pub nonce: u64,
    pub transaction_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HASH_HEX_SIZE;
    use crate::crypto::Keypair;
    use crate::transaction::TxKind;

    fn sample_txs() -> Vec<Transaction> {
        vec![
            Transaction::new_at(None, "alice", 1000, TxKind::Mint, 1_600_000_000),
            Transaction::new_at(None, "miner", 100, TxKind::Reward, 1_600_000_100),
        ]
    }

    #[test]
    fn genesis_block_example() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.previous_hash(), "0");
        assert_eq!(genesis.nonce(), 0);
        assert!(genesis.transactions().is_empty());
        assert_eq!(genesis.hash().len(), HASH_HEX_SIZE);
        assert!(genesis.has_valid_hash());
    }

    #[test]
    fn block_hash_consistency() {
        let block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        assert_eq!(block.recompute_hash(), block.recompute_hash());
        assert_eq!(block.hash(), block.recompute_hash());
    }

    #[test]
    fn block_hash_matches_header_bytes() {
        let block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&1_600_000_200u64.to_le_bytes());
        bytes.extend_from_slice(&merkle_root(&sample_txs()));
        bytes.extend_from_slice(b"0");
        bytes.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(block.template().hash_bytes(0), bytes);
        assert_eq!(block.hash(), hex::encode(sha256(&bytes)));
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let mut block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        let before = block.recompute_hash();
        block.nonce += 1;
        assert_ne!(before, block.recompute_hash());
        assert!(!block.has_valid_hash());
    }

    #[test]
    fn block_hash_changes_with_transactions() {
        let a = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        let mut txs = sample_txs();
        txs.pop();
        let b = Block::new_at(1, txs, "0", 1_600_000_200);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn mine_block_example() {
        let mut block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        let txs_before = block.transactions().to_vec();
        block.mine(3, &CancelFlag::new()).unwrap();
        assert!(block.hash().starts_with("000"));
        assert!(block.has_valid_hash());
        assert!(block.meets_difficulty(3));
        assert_eq!(block.transactions(), txs_before.as_slice());
    }

    #[test]
    fn mine_at_zero_difficulty_keeps_nonce() {
        let mut block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        block.mine(0, &CancelFlag::new()).unwrap();
        assert_eq!(block.nonce(), 0);
    }

    #[test]
    fn cancelled_mining_leaves_block_untouched() {
        let mut block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        let original = block.clone();
        let cancel = CancelFlag::new();
        cancel.cancel();
        // 64 hex zeros is unreachable, so only the flag can end the search.
        let result = block.mine(64, &cancel);
        assert!(matches!(result, Err(LedgerError::MiningCancelled)));
        assert_eq!(block, original);
    }

    #[test]
    fn has_valid_transactions_checks_signatures() {
        let keys = Keypair::generate();
        let mut signed = Transaction::transfer(keys.address(), "bob", 5);
        signed.sign(&keys).unwrap();
        let good = Block::new(1, vec![signed.clone()], "0");
        assert!(good.has_valid_transactions());

        let unsigned = Transaction::transfer(keys.address(), "bob", 6);
        let bad = Block::new(1, vec![signed, unsigned], "0");
        assert!(!bad.has_valid_transactions());
    }

    #[test]
    fn signature_is_covered_by_block_hash() {
        let keys = Keypair::generate();
        let tx = Transaction::transfer(keys.address(), "bob", 5);
        let mut signed = tx.clone();
        signed.sign(&keys).unwrap();
        let a = Block::new_at(1, vec![tx], "0", 1);
        let b = Block::new_at(1, vec![signed], "0", 1);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn block_serialization_keeps_stored_hash() {
        let mut block = Block::new_at(1, sample_txs(), "0", 1_600_000_200);
        block.mine(1, &CancelFlag::new()).unwrap();
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["nonce"] = serde_json::json!(block.nonce() + 1);
        let tampered: Block = serde_json::from_value(value).unwrap();
        assert_eq!(tampered.hash(), block.hash());
        assert!(!tampered.has_valid_hash());
    }

    #[test]
    fn digest_summarises_header() {
        let block = Block::new_at(4, sample_txs(), "abc", 9);
        let digest = block.digest();
        assert_eq!(digest.index, 4);
        assert_eq!(digest.previous_hash, "abc");
        assert_eq!(digest.transaction_count, 2);
        assert_eq!(digest.hash, block.hash());
    }
}
