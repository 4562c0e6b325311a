//! Scheduler constants for auto-sync.

/// Delay before the first pass after auto-sync starts, so it does not race start-up work.
pub const AUTO_SYNC_INITIAL_DELAY_SECS: u64 = 30;

/// Steady cadence between passes while auto-sync is enabled.
pub const AUTO_SYNC_INTERVAL_SECS: u64 = 5 * 60;

/// Pause between push and pull in a forced pass.
pub const FORCED_SYNC_SETTLE_MILLIS: u64 = 2_000;

/// Number of most recent entries pushed after a local save.
pub const RECENT_SUBSET_SIZE: usize = 5;

/// Maximum concurrent per-user fetches during an admin aggregate run.
pub const ADMIN_FETCH_CONCURRENCY: usize = 4;
