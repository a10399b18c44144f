//! Configuration loading from files and environment
//!
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/concord/config.toml`
//! 3. Project config: `<root>/.concord/config.toml`
//! 4. Environment variables: `CONCORD_*`

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use super::{
    defaults::DEFAULT_STATE_DIR,
    types::{
        CoordinationConfig, HeartbeatConfig, LockConfig, PartialConfig, StoreConfig, SweepConfig,
        SweepPolicy,
    },
};
use crate::{Error, Result};

const CONFIG_FILE: &str = "config.toml";
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration for `project_root` from all sources.
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML, has unknown keys, is a symlink or is
///   larger than 1 MiB
/// - An environment override does not parse
/// - Resulting values fail validation
pub fn load_config(project_root: &Path) -> Result<CoordinationConfig> {
    load_config_from(project_root, global_config_path().as_deref())
}

/// Like [`load_config`] with an explicit global config location.
pub fn load_config_from(
    project_root: &Path,
    global_path: Option<&Path>,
) -> Result<CoordinationConfig> {
    let config = CoordinationConfig::default();

    let config = match global_path.filter(|p| p.exists()) {
        Some(path) => config.merge_partial(load_toml_file(path)?),
        None => config,
    };

    let project_path = project_config_path(project_root);
    let config = if project_path.exists() {
        config.merge_partial(load_toml_file(&project_path)?)
    } else {
        config
    };

    let config = config.apply_env_vars()?;
    config.validate()?;

    tracing::debug!(
        state_dir = %config.state_dir,
        lock_ttl_secs = config.locks.ttl_secs,
        heartbeat_timeout_secs = config.heartbeat.timeout_secs,
        sweep_policy = %config.sweep.policy,
        "Loaded coordination config"
    );
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "concord")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULT_STATE_DIR).join(CONFIG_FILE)
}

/// Load a TOML file into a partial config
///
/// # Errors
///
/// Returns error if:
/// - Path is a symlink or a directory
/// - File is larger than 1 MiB
/// - File cannot be read
/// - TOML is malformed or has unknown keys
pub fn load_toml_file(path: &Path) -> Result<PartialConfig> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        Error::IoError(format!("Failed to stat config file {}: {e}", path.display()))
    })?;

    if metadata.file_type().is_symlink() {
        return Err(Error::InvalidConfig(format!(
            "Config file {} is a symlink; refusing to follow it",
            path.display()
        )));
    }

    if metadata.is_dir() {
        return Err(Error::IoError(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(Error::InvalidConfig(format!(
            "Config file {} is {} bytes; the limit is {MAX_CONFIG_BYTES}",
            path.display(),
            metadata.len()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::ParseError(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// MERGE
// ═══════════════════════════════════════════════════════════════════════════

impl CoordinationConfig {
    /// Overlay the keys present in `partial`.
    #[must_use]
    pub fn merge_partial(self, partial: PartialConfig) -> Self {
        Self {
            state_dir: partial.state_dir.unwrap_or(self.state_dir),
            locks: LockConfig {
                ttl_secs: partial.locks.ttl_secs.unwrap_or(self.locks.ttl_secs),
            },
            heartbeat: HeartbeatConfig {
                timeout_secs: partial
                    .heartbeat
                    .timeout_secs
                    .unwrap_or(self.heartbeat.timeout_secs),
            },
            sweep: SweepConfig {
                policy: partial.sweep.policy.unwrap_or(self.sweep.policy),
                interval_secs: partial
                    .sweep
                    .interval_secs
                    .unwrap_or(self.sweep.interval_secs),
            },
            store: StoreConfig {
                lock_wait_ms: partial.store.lock_wait_ms.unwrap_or(self.store.lock_wait_ms),
                stale_lock_secs: partial
                    .store
                    .stale_lock_secs
                    .unwrap_or(self.store.stale_lock_secs),
                base_delay_ms: partial
                    .store
                    .base_delay_ms
                    .unwrap_or(self.store.base_delay_ms),
                max_delay_ms: partial.store.max_delay_ms.unwrap_or(self.store.max_delay_ms),
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENVIRONMENT VARIABLE OVERRIDES
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply `CONCORD_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable value does not parse
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("CONCORD_STATE_DIR") {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "CONCORD_STATE_DIR cannot be empty - unset the variable or provide a directory"
                        .to_string(),
                ));
            }
            self.state_dir = value;
        }

        if let Some(ttl) = env_number("CONCORD_LOCK_TTL_SECS")? {
            self.locks.ttl_secs = ttl;
        }

        if let Some(timeout) = env_number("CONCORD_HEARTBEAT_TIMEOUT_SECS")? {
            self.heartbeat.timeout_secs = timeout;
        }

        if let Ok(value) = std::env::var("CONCORD_SWEEP_POLICY") {
            self.sweep.policy = SweepPolicy::from_str(value.trim()).map_err(|_| {
                Error::InvalidConfig(format!(
                    "Invalid CONCORD_SWEEP_POLICY value '{value}': expected opportunistic, scheduled or both"
                ))
            })?;
        }

        if let Some(interval) = env_number("CONCORD_SWEEP_INTERVAL_SECS")? {
            self.sweep.interval_secs = interval;
        }

        if let Some(wait) = env_number("CONCORD_STORE_LOCK_WAIT_MS")? {
            self.store.lock_wait_ms = wait;
        }

        Ok(self)
    }
}

fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name).map_or(Ok(None), |value| {
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("Invalid {name} value '{value}': {e}")))
    })
}
