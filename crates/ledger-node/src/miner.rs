//! Periodic mining driver. Each round hands the CPU-bound nonce search to
//! the blocking pool; shutdown goes through the shared [`CancelFlag`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledger_core::{Block, CancelFlag, Keypair, Ledger, LedgerError};
use serde::Serialize;
use tokio::task;
use tracing::{debug, error, info};

const CANCEL_POLL: Duration = Duration::from_millis(100);

pub struct Miner {
    name: String,
    keys: Keypair,
    interval: Duration,
    active: AtomicBool,
    blocks_mined: AtomicU64,
    total_rewards: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerStatus {
    pub name: String,
    pub address: String,
    pub is_active: bool,
    pub blocks_mined_count: u64,
    pub total_rewards: u64,
    pub current_balance: i128,
}

impl Miner {
    pub fn new(name: impl Into<String>, keys: Keypair, interval: Duration) -> Self {
        Self {
            name: name.into(),
            keys,
            interval,
            active: AtomicBool::new(false),
            blocks_mined: AtomicU64::new(0),
            total_rewards: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> String {
        self.keys.address()
    }

    pub fn status(&self, ledger: &Ledger) -> MinerStatus {
        let address = self.address();
        MinerStatus {
            name: self.name.clone(),
            current_balance: ledger.balance_of(&address),
            address,
            is_active: self.active.load(Ordering::Relaxed),
            blocks_mined_count: self.blocks_mined.load(Ordering::Relaxed),
            total_rewards: self.total_rewards.load(Ordering::Relaxed),
        }
    }

    /// Mine once if anything is pending. `Ok(None)` means the round was
    /// skipped.
    pub async fn mine_round(
        &self,
        ledger: &Arc<Ledger>,
        cancel: &CancelFlag,
    ) -> anyhow::Result<Option<Block>> {
        if ledger.pending_count() == 0 {
            debug!(miner = %self.name, "no pending transactions, skipping round");
            return Ok(None);
        }

        let block = {
            let ledger = ledger.clone();
            let address = self.address();
            let cancel = cancel.clone();
            task::spawn_blocking(move || ledger.mine_with_cancel(&address, &cancel)).await??
        };

        let reward = ledger.mining_reward();
        let mined = self.blocks_mined.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_rewards.fetch_add(reward, Ordering::Relaxed);
        info!(
            miner = %self.name,
            index = block.index(),
            reward,
            blocks_mined = mined,
            balance = %ledger.balance_of(&self.address()),
            "miner sealed block"
        );
        Ok(Some(block))
    }

    /// Mine every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, ledger: Arc<Ledger>, cancel: CancelFlag) {
        self.active.store(true, Ordering::Relaxed);
        info!(miner = %self.name, address = %self.address(), interval = ?self.interval, "miner started");

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled(&cancel) => break,
            }
            match self.mine_round(&ledger, &cancel).await {
                Ok(_) => {}
                Err(e) if is_cancellation(&e) => break,
                Err(e) => error!(miner = %self.name, error = %e, "mining round failed"),
            }
        }

        self.active.store(false, Ordering::Relaxed);
        info!(
            miner = %self.name,
            blocks_mined = self.blocks_mined.load(Ordering::Relaxed),
            total_rewards = self.total_rewards.load(Ordering::Relaxed),
            "miner stopped"
        );
    }
}

async fn cancelled(cancel: &CancelFlag) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::MiningCancelled)
    )
}
