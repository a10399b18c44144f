//! # Concord Core
//!
//! Coordination for autonomous agent processes that edit one project checkout
//! at the same time: who is running, who may write which file, and what the
//! group has decided.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! Only storage-level failures are `Err`. Lock contention, expired leases and
//! content conflicts come back as outcome enums carrying a [`LockIssue`].
//!
//! ## Layout
//!
//! - [`store`]: atomic read-modify-write over JSON documents
//! - [`registry`], [`heartbeat`], [`sweep`]: instance lifecycle and liveness
//! - [`locks`], [`gate`]: lease-based file locks and the pre-write gate
//! - [`decisions`]: append-only decision log
//! - [`coordinator`]: facade binding all of the above to one project

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod decisions;
mod error;
pub mod filelock;
pub mod fingerprint;
pub mod gate;
pub mod heartbeat;
pub mod identity;
pub mod locks;
pub mod paths;
pub mod registry;
pub mod store;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, WallClock};
pub use config::{CoordinationConfig, SweepPolicy};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use decisions::{Decision, DecisionCategory, DecisionStatus, NewDecision};
pub use error::{Error, Result};
pub use gate::GateDecision;
pub use heartbeat::{HeartbeatRecord, HeartbeatStatus};
pub use identity::InstanceId;
pub use locks::{
    AcquireOutcome, ConflictCheck, LockIssue, LockRecord, ReleaseOutcome, RenewOutcome,
};
pub use paths::LockPath;
pub use registry::{Instance, InstanceStatus, Unregistration};
pub use sweep::{StaleReclaim, SweepReport};
