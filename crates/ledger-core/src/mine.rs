use crate::{block::Block, error::LedgerError, error::Result, pow::meets_difficulty};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

/// Shared stop signal for a nonce search. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Mines a block by searching nonces in parallel until its hash starts with
/// `difficulty` zero hex digits. Only the nonce and hash of the returned
/// block differ from the input.
pub fn mine_parallel(block: Block, difficulty: usize, cancel: &CancelFlag) -> Result<Block> {
    // The template is fixed; workers vary only the nonce.
    let template = block.template();
    let start = block.nonce();

    // Rayon splits the remaining nonce range across its pool. A worker that
    // sees the cancel flag reports its nonce so the search winds down.
    let found = (start..u64::MAX).into_par_iter().find_any(|nonce| {
        cancel.is_cancelled() || meets_difficulty(&template.hash_at(*nonce), difficulty)
    });

    let Some(nonce) = found else {
        return Err(LedgerError::MiningCancelled);
    };
    let hash = template.hash_at(nonce);
    if !meets_difficulty(&hash, difficulty) {
        return Err(LedgerError::MiningCancelled);
    }

    info!(
        index = block.index(),
        nonce,
        hash = %hex::encode(hash),
        "mined block in parallel"
    );

    let mut block = block;
    block.set_mined(nonce, hash);
    Ok(block)
}
