//! The chain, its pending pool and the derived balance table.
//!
//! Chain and balances sit behind one `RwLock` so a mined block is appended
//! and folded in a single write; readers never observe half a block. The
//! pending pool has its own mutex so submissions keep flowing while a nonce
//! search runs. When both are held the state lock is always taken first.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::block::{Block, BlockDigest};
use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, GENESIS_PREVIOUS_HASH};
use crate::error::{IntegrityFault, LedgerError, Result};
use crate::mine::{mine_parallel, CancelFlag};
use crate::transaction::{Transaction, TxKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Leading zero hex digits a mined block hash must have.
    pub difficulty: usize,
    pub mining_reward: u64,
    /// Shard the nonce search across the rayon pool.
    pub parallel_mining: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            parallel_mining: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSummary {
    pub length: usize,
    pub difficulty: usize,
    pub pending_count: usize,
    pub total_supply: i128,
    pub latest_block: BlockDigest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLocation {
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
}

/// Consistent copy of the whole ledger for export.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub difficulty: usize,
    pub pending_transactions: Vec<Transaction>,
    pub mining_reward: u64,
    pub balances: BTreeMap<String, i128>,
}

#[derive(Debug)]
struct ChainState {
    chain: Vec<Block>,
    balances: BTreeMap<String, i128>,
}

impl ChainState {
    fn replay(blocks: Vec<Block>) -> Self {
        let mut state = Self {
            chain: Vec::with_capacity(blocks.len().max(1)),
            balances: BTreeMap::new(),
        };
        if blocks.is_empty() {
            state.chain.push(Block::genesis());
        }
        for block in blocks {
            state.append(block);
        }
        state
    }

    fn append(&mut self, block: Block) {
        for tx in block.transactions() {
            fold_transaction(&mut self.balances, tx);
        }
        self.chain.push(block);
    }

    fn latest(&self) -> &Block {
        // Never empty: replay always seeds a genesis block.
        &self.chain[self.chain.len() - 1]
    }

    fn balance_of(&self, address: &str) -> i128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn find_transaction(&self, id: &str) -> Option<TransactionLocation> {
        self.chain.iter().find_map(|block| {
            block
                .transactions()
                .iter()
                .find(|tx| tx.id() == id)
                .map(|tx| TransactionLocation {
                    transaction: tx.clone(),
                    block_index: block.index(),
                    block_hash: block.hash().to_string(),
                })
        })
    }
}

fn fold_transaction(balances: &mut BTreeMap<String, i128>, tx: &Transaction) {
    let amount = i128::from(tx.amount());
    match tx.kind() {
        TxKind::Mint | TxKind::Reward => {
            *balances.entry(tx.to_address().to_string()).or_insert(0) += amount;
        }
        TxKind::Transfer => {
            if let Some(from) = tx.from_address() {
                *balances.entry(from.to_string()).or_insert(0) -= amount;
            }
            *balances.entry(tx.to_address().to_string()).or_insert(0) += amount;
        }
        TxKind::Burn => {
            if let Some(from) = tx.from_address() {
                *balances.entry(from.to_string()).or_insert(0) -= amount;
            }
        }
    }
}

/// Check hash integrity, linkage, proof of work and transaction validity of
/// a block sequence, stopping at the first bad block.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<()> {
    let violation = |index: u64, fault: IntegrityFault| LedgerError::ChainIntegrityViolation { index, fault };

    if let Some(genesis) = chain.first() {
        if genesis.index() != 0
            || genesis.previous_hash() != GENESIS_PREVIOUS_HASH
            || !genesis.transactions().is_empty()
        {
            return Err(violation(genesis.index(), IntegrityFault::BadGenesis));
        }
        if !genesis.has_valid_hash() {
            return Err(violation(genesis.index(), IntegrityFault::HashMismatch));
        }
    }
    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if previous.index().checked_add(1) != Some(current.index()) {
            return Err(violation(current.index(), IntegrityFault::BadIndex));
        }
        if !current.has_valid_transactions() {
            return Err(violation(current.index(), IntegrityFault::InvalidTransactions));
        }
        if !current.has_valid_hash() {
            return Err(violation(current.index(), IntegrityFault::HashMismatch));
        }
        if current.previous_hash() != previous.hash() {
            return Err(violation(current.index(), IntegrityFault::BrokenLink));
        }
        if !current.meets_difficulty(difficulty) {
            return Err(violation(current.index(), IntegrityFault::InsufficientWork));
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    state: RwLock<ChainState>,
    pending: Mutex<Vec<Transaction>>,
    mining: Mutex<()>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self::restore(config, Vec::new())
    }

    /// Rebuild a ledger from an existing block sequence by replaying its
    /// balances. The blocks are taken as given; call [`Ledger::validate`] to
    /// check them. An empty sequence yields a fresh genesis block.
    pub fn restore(config: LedgerConfig, blocks: Vec<Block>) -> Self {
        let state = ChainState::replay(blocks);
        info!(
            length = state.chain.len(),
            difficulty = config.difficulty,
            genesis = %state.chain[0].hash(),
            "ledger initialised"
        );
        Self {
            config,
            state: RwLock::new(state),
            pending: Mutex::new(Vec::new()),
            mining: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> u64 {
        self.config.mining_reward
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a system-issued mint. Balances change only once it is mined.
    pub fn mint(&self, to_address: impl Into<String>, amount: u64) -> Transaction {
        let tx = Transaction::mint(to_address, amount);
        self.lock_pending().push(tx.clone());
        info!(to = tx.to_address(), amount, id = tx.id(), "mint queued");
        tx
    }

    /// Admit a transaction into the pending pool.
    ///
    /// Transfers are checked against the sender's mined balance only, so
    /// several pending transfers can together spend more than the sender
    /// holds. On any rejection the pool is left as it was.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        let reject = |reason: LedgerError| {
            warn!(id = tx.id(), %reason, "transaction rejected");
            LedgerError::not_admitted(tx.id(), reason)
        };

        match tx.verify() {
            Ok(true) => {}
            Ok(false) => return Err(reject(LedgerError::SignatureVerificationFailed)),
            Err(e) => return Err(reject(e)),
        }

        let state = self.read_state();
        if state.find_transaction(tx.id()).is_some() {
            return Err(reject(LedgerError::DuplicateTransaction(tx.id().to_string())));
        }
        if let (TxKind::Transfer, Some(from)) = (tx.kind(), tx.from_address()) {
            let balance = state.balance_of(from);
            if balance < i128::from(tx.amount()) {
                return Err(reject(LedgerError::InsufficientBalance {
                    address: from.to_string(),
                    balance,
                    required: tx.amount(),
                }));
            }
        }

        let mut pending = self.lock_pending();
        if pending.iter().any(|p| p.id() == tx.id()) {
            drop(pending);
            return Err(reject(LedgerError::DuplicateTransaction(tx.id().to_string())));
        }
        info!(
            id = tx.id(),
            kind = %tx.kind(),
            from = tx.from_address().unwrap_or("system"),
            to = tx.to_address(),
            amount = tx.amount(),
            "transaction admitted"
        );
        pending.push(tx);
        Ok(())
    }

    pub fn mine(&self, reward_address: &str) -> Result<Block> {
        self.mine_with_cancel(reward_address, &CancelFlag::new())
    }

    /// Mine everything pending plus a reward for `reward_address`.
    ///
    /// The pool is snapshotted, not drained, before the nonce search;
    /// anything submitted during the search stays for the next round. If
    /// `cancel` fires the block is dropped and chain and pool are untouched.
    pub fn mine_with_cancel(&self, reward_address: &str, cancel: &CancelFlag) -> Result<Block> {
        let _mining = self.mining.lock().unwrap_or_else(PoisonError::into_inner);

        let (index, previous_hash) = {
            let state = self.read_state();
            (state.chain.len() as u64, state.latest().hash().to_string())
        };
        let mut txs = self.lock_pending().clone();
        let snapshot_len = txs.len();
        txs.push(Transaction::reward(reward_address, self.config.mining_reward));

        debug!(index, transactions = txs.len(), difficulty = self.config.difficulty, "mining started");
        let block = Block::new(index, txs, previous_hash);
        let mined = if self.config.parallel_mining {
            mine_parallel(block, self.config.difficulty, cancel)
        } else {
            let mut block = block;
            block.mine(self.config.difficulty, cancel).map(|()| block)
        };
        let block = match mined {
            Ok(block) => block,
            Err(e) => {
                warn!(index, error = %e, "mining aborted");
                return Err(e);
            }
        };

        {
            let mut state = self.write_state();
            state.append(block.clone());
            self.lock_pending().drain(..snapshot_len);
        }
        info!(
            index = block.index(),
            nonce = block.nonce(),
            hash = block.hash(),
            transactions = block.transactions().len(),
            reward_to = reward_address,
            "block mined"
        );
        Ok(block)
    }

    /// First integrity violation in the chain, if any.
    pub fn validate(&self) -> Result<()> {
        let state = self.read_state();
        validate_chain(&state.chain, self.config.difficulty)
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "chain validation failed");
                false
            }
        }
    }

    pub fn balance_of(&self, address: &str) -> i128 {
        self.read_state().balance_of(address)
    }

    pub fn all_balances(&self) -> BTreeMap<String, i128> {
        self.read_state().balances.clone()
    }

    pub fn total_supply(&self) -> i128 {
        self.read_state().balances.values().sum()
    }

    pub fn chain_summary(&self) -> ChainSummary {
        let state = self.read_state();
        ChainSummary {
            length: state.chain.len(),
            difficulty: self.config.difficulty,
            pending_count: self.lock_pending().len(),
            total_supply: state.balances.values().sum(),
            latest_block: state.latest().digest(),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read_state();
        LedgerSnapshot {
            chain: state.chain.clone(),
            difficulty: self.config.difficulty,
            pending_transactions: self.lock_pending().clone(),
            mining_reward: self.config.mining_reward,
            balances: state.balances.clone(),
        }
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.lock_pending().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn len(&self) -> usize {
        self.read_state().chain.len()
    }

    /// A ledger always holds its genesis block.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read_state().chain.clone()
    }

    pub fn latest_block(&self) -> Block {
        self.read_state().latest().clone()
    }

    /// Newest-first page of blocks, `page` counting from 1. Returns the page
    /// and the chain length.
    pub fn blocks_page(&self, page: usize, limit: usize) -> (Vec<Block>, usize) {
        let state = self.read_state();
        let total = state.chain.len();
        let page = page.max(1);
        let end = total.saturating_sub((page - 1).saturating_mul(limit));
        let start = end.saturating_sub(limit);
        let blocks = state.chain[start..end].iter().rev().cloned().collect();
        (blocks, total)
    }

    pub fn block_by_index(&self, index: u64) -> Option<Block> {
        let state = self.read_state();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.chain.get(i))
            .cloned()
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.read_state()
            .chain
            .iter()
            .find(|block| block.hash() == hash)
            .cloned()
    }

    pub fn transaction_by_id(&self, id: &str) -> Option<TransactionLocation> {
        self.read_state().find_transaction(id)
    }

    #[cfg(test)]
    fn with_chain_mut<R>(&self, f: impl FnOnce(&mut Vec<Block>) -> R) -> R {
        f(&mut self.write_state().chain)
    }
}
