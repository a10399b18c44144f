//! Pre-write gate.
//!
//! The tool layer calls [`LockManager::gate_write`] right before it mutates a
//! file and proceeds only if the decision allows it. After each write it
//! allowed, the holder calls [`LockManager::record_write`] so the recorded
//! fingerprint covers its own change. A holder that skips this step is
//! denied at its next gate with a conflict against itself: the gate cannot
//! tell an unrecorded own write from a change made behind the holder's back.

use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::{
    identity::InstanceId,
    locks::{AcquireOutcome, ConflictCheck, LockIssue, LockManager},
    paths::LockPath,
    Result,
};

/// Allow or deny a pending write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub path: LockPath,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<LockIssue>,
}

impl LockManager<'_> {
    /// Acquire `path` for `holder` and confirm nobody changed it behind the
    /// holder's back.
    ///
    /// An expired lease found on the first attempt is cleared and acquisition
    /// retried exactly once. Re-gating a path the holder already holds renews
    /// the lease but keeps the recorded fingerprint.
    pub fn gate_write(
        &self,
        holder: &InstanceId,
        path: impl AsRef<Path>,
        intent: &str,
    ) -> Result<GateDecision> {
        let path = self.resolve(path)?;

        let mut outcome = self.acquire(holder, path.as_str(), intent)?;
        if matches!(outcome, AcquireOutcome::ExpiredAndRetry { .. }) {
            outcome = self.acquire(holder, path.as_str(), intent)?;
        }

        let record = match outcome {
            AcquireOutcome::Granted { record, .. } => record,
            AcquireOutcome::HeldByOther {
                holder: other,
                acquired_at,
                expires_at,
                ..
            } => {
                return Ok(deny(
                    holder,
                    LockIssue::LockHeld {
                        path,
                        holder: other,
                        acquired_at,
                        expires_at,
                    },
                ))
            }
            AcquireOutcome::ExpiredAndRetry {
                previous_holder,
                expired_at,
                ..
            } => {
                return Ok(deny(
                    holder,
                    LockIssue::LockExpired {
                        path,
                        holder: previous_holder,
                        expired_at,
                    },
                ))
            }
        };

        match self.check_conflict(path.as_str())? {
            ConflictCheck::Conflict {
                path,
                holder: owner,
                expected,
                actual,
            } => {
                let own = owner == *holder;
                let mut decision = deny(
                    holder,
                    LockIssue::ConflictDetected {
                        path,
                        holder: owner,
                        expected,
                        actual,
                    },
                );
                if own {
                    decision.reason.push_str(
                        "; if this was your own write, record it with record_write first",
                    );
                }
                Ok(decision)
            }
            ConflictCheck::Clean { .. } | ConflictCheck::Unlocked { .. } => Ok(GateDecision {
                allowed: true,
                reason: format!(
                    "'{path}' locked by {holder} until {}",
                    record.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
                path,
                issue: None,
            }),
        }
    }
}

fn deny(requester: &InstanceId, issue: LockIssue) -> GateDecision {
    let path = match &issue {
        LockIssue::LockHeld { path, .. }
        | LockIssue::LockExpired { path, .. }
        | LockIssue::ConflictDetected { path, .. }
        | LockIssue::NotHolder { path, .. }
        | LockIssue::NotLocked { path } => path.clone(),
    };
    let reason = issue.to_string();
    tracing::info!(path = %path, requester = %requester, code = issue.code(), "Write denied");
    GateDecision {
        allowed: false,
        path,
        reason,
        issue: Some(issue),
    }
}
