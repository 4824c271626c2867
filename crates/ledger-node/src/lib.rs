//! Ledger node: a periodic [`miner::Miner`] and the explorer [`api`] over a
//! shared in-memory [`ledger_core::Ledger`].

pub mod api;
pub mod config;
pub mod miner;

mod constants;
