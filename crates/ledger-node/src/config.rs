use std::time::Duration;

use clap::Parser;
use ledger_core::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD},
    Keypair, LedgerConfig,
};

use crate::constants::{DEFAULT_LISTEN, DEFAULT_MINE_INTERVAL_SECS};

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "In-memory proof-of-work ledger with a miner and explorer API")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:3000
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Leading zero hex digits required of a block hash
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Amount credited to the miner for every block
    #[arg(long, env = "LEDGER_MINING_REWARD", default_value_t = DEFAULT_MINING_REWARD)]
    pub mining_reward: u64,

    /// Seconds between mining rounds
    #[arg(long, env = "LEDGER_MINE_INTERVAL_SECS", default_value_t = DEFAULT_MINE_INTERVAL_SECS)]
    pub mine_interval_secs: u64,

    /// Search nonces on all cores
    #[arg(long, env = "LEDGER_PARALLEL_MINING")]
    pub parallel: bool,

    /// Display name of the built-in miner
    #[arg(long, default_value = "Miner1")]
    pub miner_name: String,

    /// Hex secret key for the miner's reward address; generated when absent
    #[arg(long, env = "LEDGER_MINER_KEY")]
    pub miner_key: Option<String>,
}

impl Args {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            parallel_mining: self.parallel,
        }
    }

    pub fn mine_interval(&self) -> Duration {
        Duration::from_secs(self.mine_interval_secs.max(1))
    }

    pub fn miner_keys(&self) -> anyhow::Result<Keypair> {
        match &self.miner_key {
            Some(secret) => Ok(Keypair::from_secret_hex(secret)?),
            None => Ok(Keypair::generate()),
        }
    }
}
