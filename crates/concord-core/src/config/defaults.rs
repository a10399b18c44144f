//! Default configuration values

use super::types::{
    CoordinationConfig, HeartbeatConfig, LockConfig, StoreConfig, SweepConfig, SweepPolicy,
};

/// State directory under the project root.
pub const DEFAULT_STATE_DIR: &str = ".concord";

const LOCK_TTL_SECS: u32 = 300;
const HEARTBEAT_TIMEOUT_SECS: u32 = 300;
const SWEEP_INTERVAL_SECS: u32 = 60;
const STORE_LOCK_WAIT_MS: u64 = 10_000;
const STORE_STALE_LOCK_SECS: u64 = 30;
const STORE_BASE_DELAY_MS: u64 = 2;
const STORE_MAX_DELAY_MS: u64 = 250;

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            state_dir: DEFAULT_STATE_DIR.to_string(),
            locks: LockConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            sweep: SweepConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: LOCK_TTL_SECS,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: HEARTBEAT_TIMEOUT_SECS,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            policy: SweepPolicy::default(),
            interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: STORE_LOCK_WAIT_MS,
            stale_lock_secs: STORE_STALE_LOCK_SECS,
            base_delay_ms: STORE_BASE_DELAY_MS,
            max_delay_ms: STORE_MAX_DELAY_MS,
        }
    }
}
