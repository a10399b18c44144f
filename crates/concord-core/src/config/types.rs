//! Configuration type definitions

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::filelock::LockOptions;

/// When stale instances are swept.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SweepPolicy {
    /// Sweep on every lock acquisition
    #[default]
    Opportunistic,
    /// Only a background sweeper reclaims stale instances
    Scheduled,
    /// Both of the above
    Both,
}

impl SweepPolicy {
    pub const fn sweeps_on_acquire(self) -> bool {
        matches!(self, Self::Opportunistic | Self::Both)
    }

    pub const fn runs_scheduled(self) -> bool {
        matches!(self, Self::Scheduled | Self::Both)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// State directory, relative to the project root unless absolute
    pub state_dir: String,
    pub locks: LockConfig,
    pub heartbeat: HeartbeatConfig,
    pub sweep: SweepConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease length for file locks
    pub ttl_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat age after which an instance is considered dead
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub policy: SweepPolicy,
    /// Period of the scheduled sweeper
    pub interval_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on waiting for a document lock
    pub lock_wait_ms: u64,
    /// Age after which a contended lock file may be broken
    pub stale_lock_secs: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl CoordinationConfig {
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::seconds(i64::from(self.locks.ttl_secs))
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::seconds(i64::from(self.heartbeat.timeout_secs))
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.sweep.interval_secs))
    }

    #[must_use]
    pub fn lock_options(&self) -> LockOptions {
        LockOptions::new()
            .with_max_wait_ms(self.store.lock_wait_ms)
            .with_stale_after_secs(self.store.stale_lock_secs)
            .with_base_delay_ms(self.store.base_delay_ms)
            .with_max_delay_ms(self.store.max_delay_ms)
    }

    /// Absolute state directory for a project.
    #[must_use]
    pub fn state_path(&self, project_root: &Path) -> PathBuf {
        let dir = Path::new(&self.state_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            project_root.join(dir)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PARTIAL (FILE) FORMS
// ═══════════════════════════════════════════════════════════════════════════

/// A config file: every key optional, unknown keys rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub state_dir: Option<String>,
    #[serde(default)]
    pub locks: PartialLockConfig,
    #[serde(default)]
    pub heartbeat: PartialHeartbeatConfig,
    #[serde(default)]
    pub sweep: PartialSweepConfig,
    #[serde(default)]
    pub store: PartialStoreConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLockConfig {
    pub ttl_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialHeartbeatConfig {
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialSweepConfig {
    pub policy: Option<SweepPolicy>,
    pub interval_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialStoreConfig {
    pub lock_wait_ms: Option<u64>,
    pub stale_lock_secs: Option<u64>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}
