pub(crate) const BLOCKS_PER_PAGE: usize = 10;
pub(crate) const MAX_BLOCKS_PER_REQUEST: usize = BLOCKS_PER_PAGE * 10;
pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub(crate) const DEFAULT_MINE_INTERVAL_SECS: u64 = 30;
