//! Coordination configuration
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/concord/config.toml`
//! 3. Project config: `<root>/.concord/config.toml`
//! 4. Environment variables: `CONCORD_*`
//!
//! Only keys present in a file override lower layers; unknown keys are
//! rejected.
//!
//! # Example Config
//!
//! ```toml
//! [locks]
//! ttl_secs = 600
//!
//! [sweep]
//! policy = "both"
//! interval_secs = 30
//! ```
//!
//! # Module Structure
//!
//! - `types`: configuration structures and their partial (file) forms
//! - `defaults`: default values
//! - `load`: loading from files and environment, merging
//! - `validate`: range checks

mod defaults;
mod load;
mod types;
mod validate;

#[cfg(test)]
mod tests_loading;

pub use defaults::DEFAULT_STATE_DIR;
pub use load::{global_config_path, load_config, load_config_from, load_toml_file};
pub use types::{
    CoordinationConfig, HeartbeatConfig, LockConfig, PartialConfig, StoreConfig, SweepConfig,
    SweepPolicy,
};
