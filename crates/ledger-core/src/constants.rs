pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const PUBLIC_KEY_HEX_SIZE: usize = 64;
pub const SIGNATURE_HEX_SIZE: usize = 128;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const DEFAULT_DIFFICULTY: usize = 2;
pub const DEFAULT_MINING_REWARD: u64 = 100;
/// Nonces tried between two looks at the cancel flag in the sequential search.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;
