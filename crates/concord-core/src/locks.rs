//! Lease-based file locks.
//!
//! One document per locked path, `locks/<key>.json`, so contention on one
//! path never blocks operations on another. A lock is valid while
//! `now <= expires_at`; an expired record is dead weight that the next
//! acquirer clears.
//!
//! Contention is data: every operation returns an outcome enum, and each
//! non-success outcome converts to a [`LockIssue`] with a stable code and a
//! message naming the holder and lease timestamps. Only storage failures are
//! `Err`.

use std::{fmt, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    coordinator::Shared,
    fingerprint::Fingerprint,
    identity::InstanceId,
    paths::LockPath,
    registry::InstanceRegistry,
    store::{Commit, LOCKS_DIR},
    sweep, Result,
};

/// Persisted lock on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub path: LockPath,
    pub holder: InstanceId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Content at acquisition, or at the holder's last recorded write
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub renewals: u32,
}

impl LockRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════

/// Why a lock operation did not simply succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum LockIssue {
    LockHeld {
        path: LockPath,
        holder: InstanceId,
        acquired_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    LockExpired {
        path: LockPath,
        holder: InstanceId,
        expired_at: DateTime<Utc>,
    },
    ConflictDetected {
        path: LockPath,
        holder: InstanceId,
        expected: Fingerprint,
        actual: Fingerprint,
    },
    NotHolder {
        path: LockPath,
        holder: InstanceId,
        requester: InstanceId,
    },
    NotLocked {
        path: LockPath,
    },
}

impl LockIssue {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockHeld { .. } => "LOCK_HELD",
            Self::LockExpired { .. } => "LOCK_EXPIRED",
            Self::ConflictDetected { .. } => "CONFLICT_DETECTED",
            Self::NotHolder { .. } => "NOT_HOLDER",
            Self::NotLocked { .. } => "NOT_LOCKED",
        }
    }
}

fn stamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl fmt::Display for LockIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockHeld {
                path,
                holder,
                acquired_at,
                expires_at,
            } => write!(
                f,
                "'{path}' is locked by {holder} (acquired {}, expires {})",
                stamp(acquired_at),
                stamp(expires_at)
            ),
            Self::LockExpired {
                path,
                holder,
                expired_at,
            } => write!(
                f,
                "lease on '{path}' held by {holder} expired at {}; retry to acquire",
                stamp(expired_at)
            ),
            Self::ConflictDetected {
                path,
                holder,
                expected,
                actual,
            } => write!(
                f,
                "'{path}' changed since {holder} last recorded it (expected {expected}, found {actual})"
            ),
            Self::NotHolder {
                path,
                holder,
                requester,
            } => write!(f, "'{path}' is locked by {holder}, not {requester}"),
            Self::NotLocked { path } => write!(f, "'{path}' is not locked"),
        }
    }
}

/// Result of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcquireOutcome {
    /// The caller holds the lock; `renewed` if it already did
    Granted { record: LockRecord, renewed: bool },
    /// Another instance holds a valid lease
    HeldByOther {
        path: LockPath,
        holder: InstanceId,
        acquired_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        intent: String,
    },
    /// An expired record was cleared; call again to acquire
    ExpiredAndRetry {
        path: LockPath,
        previous_holder: InstanceId,
        expired_at: DateTime<Utc>,
    },
}

impl AcquireOutcome {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    #[must_use]
    pub fn issue(&self) -> Option<LockIssue> {
        match self {
            Self::Granted { .. } => None,
            Self::HeldByOther {
                path,
                holder,
                acquired_at,
                expires_at,
                ..
            } => Some(LockIssue::LockHeld {
                path: path.clone(),
                holder: holder.clone(),
                acquired_at: *acquired_at,
                expires_at: *expires_at,
            }),
            Self::ExpiredAndRetry {
                path,
                previous_holder,
                expired_at,
            } => Some(LockIssue::LockExpired {
                path: path.clone(),
                holder: previous_holder.clone(),
                expired_at: *expired_at,
            }),
        }
    }
}

/// Result of [`LockManager::release`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released { path: LockPath },
    NotLocked { path: LockPath },
    NotHolder { path: LockPath, holder: InstanceId },
}

impl ReleaseOutcome {
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }

    #[must_use]
    pub fn issue(&self, requester: &InstanceId) -> Option<LockIssue> {
        match self {
            Self::Released { .. } => None,
            Self::NotLocked { path } => Some(LockIssue::NotLocked { path: path.clone() }),
            Self::NotHolder { path, holder } => Some(LockIssue::NotHolder {
                path: path.clone(),
                holder: holder.clone(),
                requester: requester.clone(),
            }),
        }
    }
}

/// Result of [`LockManager::renew`] and [`LockManager::record_write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenewOutcome {
    Renewed {
        record: LockRecord,
    },
    NotLocked {
        path: LockPath,
    },
    NotHolder {
        path: LockPath,
        holder: InstanceId,
    },
    /// The caller's own lease ran out; acquire again
    Expired {
        path: LockPath,
        expired_at: DateTime<Utc>,
    },
}

impl RenewOutcome {
    #[must_use]
    pub const fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }

    #[must_use]
    pub fn issue(&self, requester: &InstanceId) -> Option<LockIssue> {
        match self {
            Self::Renewed { .. } => None,
            Self::NotLocked { path } => Some(LockIssue::NotLocked { path: path.clone() }),
            Self::NotHolder { path, holder } => Some(LockIssue::NotHolder {
                path: path.clone(),
                holder: holder.clone(),
                requester: requester.clone(),
            }),
            Self::Expired { path, expired_at } => Some(LockIssue::LockExpired {
                path: path.clone(),
                holder: requester.clone(),
                expired_at: *expired_at,
            }),
        }
    }
}

/// Result of [`LockManager::check_conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConflictCheck {
    /// Content matches what the holder recorded
    Clean {
        path: LockPath,
        holder: InstanceId,
        fingerprint: Fingerprint,
    },
    /// No valid lock on the path
    Unlocked { path: LockPath },
    /// Content changed out from under the holder
    Conflict {
        path: LockPath,
        holder: InstanceId,
        expected: Fingerprint,
        actual: Fingerprint,
    },
}

impl ConflictCheck {
    #[must_use]
    pub fn issue(&self) -> Option<LockIssue> {
        match self {
            Self::Clean { .. } | Self::Unlocked { .. } => None,
            Self::Conflict {
                path,
                holder,
                expected,
                actual,
            } => Some(LockIssue::ConflictDetected {
                path: path.clone(),
                holder: holder.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCK MANAGER
// ═══════════════════════════════════════════════════════════════════════════

/// Acquire, renew, release and inspect file locks.
#[derive(Debug, Clone, Copy)]
pub struct LockManager<'a> {
    pub(crate) shared: &'a Shared,
}

fn document(path: &LockPath) -> String {
    format!("{LOCKS_DIR}/{}.json", path.key())
}

enum Refresh {
    LeaseOnly,
    LeaseAndFingerprint,
}

impl<'a> LockManager<'a> {
    pub(crate) const fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    pub(crate) fn resolve(&self, raw: impl AsRef<Path>) -> Result<LockPath> {
        LockPath::resolve(&self.shared.project_root, raw)
    }

    /// Take (or renew) the lock on `path` for `holder`.
    ///
    /// Unless the sweep policy is `scheduled`, a staleness sweep runs first;
    /// its failure is logged and does not block acquisition.
    pub fn acquire(
        &self,
        holder: &InstanceId,
        path: impl AsRef<Path>,
        intent: &str,
    ) -> Result<AcquireOutcome> {
        if self.shared.config.sweep.policy.sweeps_on_acquire() {
            if let Err(e) = sweep::reclaim_stale(self.shared) {
                tracing::warn!(error = %e, "Opportunistic sweep failed; continuing with acquire");
            }
        }

        let path = self.resolve(path)?;
        let absolute = path.absolute(&self.shared.project_root);
        let now = self.shared.now();
        let expires_at = now + self.shared.config.lock_ttl();

        let outcome = self
            .shared
            .store
            .transact(&document(&path), |current: Option<LockRecord>| {
                Ok(match current {
                    None => {
                        let record = LockRecord {
                            path: path.clone(),
                            holder: holder.clone(),
                            acquired_at: now,
                            expires_at,
                            fingerprint: Fingerprint::of_file(&absolute)?,
                            intent: intent.to_string(),
                            renewals: 0,
                        };
                        (
                            Commit::Replace(record.clone()),
                            AcquireOutcome::Granted {
                                record,
                                renewed: false,
                            },
                        )
                    }
                    Some(record) if record.is_expired(now) => (
                        Commit::Remove,
                        AcquireOutcome::ExpiredAndRetry {
                            path: path.clone(),
                            previous_holder: record.holder,
                            expired_at: record.expires_at,
                        },
                    ),
                    Some(mut record) if record.holder == *holder => {
                        record.expires_at = record.expires_at.max(expires_at);
                        record.renewals = record.renewals.saturating_add(1);
                        if !intent.is_empty() {
                            record.intent = intent.to_string();
                        }
                        (
                            Commit::Replace(record.clone()),
                            AcquireOutcome::Granted {
                                record,
                                renewed: true,
                            },
                        )
                    }
                    Some(record) => (
                        Commit::Unchanged,
                        AcquireOutcome::HeldByOther {
                            path: path.clone(),
                            holder: record.holder,
                            acquired_at: record.acquired_at,
                            expires_at: record.expires_at,
                            intent: record.intent,
                        },
                    ),
                })
            })?;

        match &outcome {
            AcquireOutcome::Granted { record, renewed } => {
                tracing::info!(
                    path = %record.path,
                    holder = %record.holder,
                    expires_at = %record.expires_at,
                    renewed,
                    "Lock granted"
                );
                self.mirror(holder, &path, true);
            }
            AcquireOutcome::ExpiredAndRetry {
                previous_holder,
                expired_at,
                ..
            } => {
                tracing::debug!(
                    path = %path,
                    previous_holder = %previous_holder,
                    expired_at = %expired_at,
                    "Cleared expired lock"
                );
                self.mirror(previous_holder, &path, false);
            }
            AcquireOutcome::HeldByOther { holder: other, .. } => {
                tracing::debug!(path = %path, holder = %other, requester = %holder, "Lock held by another instance");
            }
        }

        Ok(outcome)
    }

    /// Release `holder`'s lock on `path`.
    ///
    /// A record held by someone else is left untouched, even if expired.
    pub fn release(&self, holder: &InstanceId, path: impl AsRef<Path>) -> Result<ReleaseOutcome> {
        let path = self.resolve(path)?;
        let outcome = self
            .shared
            .store
            .transact(&document(&path), |current: Option<LockRecord>| {
                Ok(match current {
                    None => (
                        Commit::Unchanged,
                        ReleaseOutcome::NotLocked { path: path.clone() },
                    ),
                    Some(record) if record.holder == *holder => (
                        Commit::Remove,
                        ReleaseOutcome::Released { path: path.clone() },
                    ),
                    Some(record) => (
                        Commit::Unchanged,
                        ReleaseOutcome::NotHolder {
                            path: path.clone(),
                            holder: record.holder,
                        },
                    ),
                })
            })?;

        if outcome.is_released() {
            tracing::info!(path = %path, holder = %holder, "Lock released");
            self.mirror(holder, &path, false);
        } else {
            tracing::debug!(path = %path, requester = %holder, ?outcome, "Release rejected");
        }
        Ok(outcome)
    }

    /// Extend `holder`'s lease: `expires_at = max(previous, now + ttl)`.
    pub fn renew(&self, holder: &InstanceId, path: impl AsRef<Path>) -> Result<RenewOutcome> {
        self.refresh(holder, path, &Refresh::LeaseOnly)
    }

    /// After the holder's own write: refresh the recorded fingerprint and
    /// extend the lease, so later conflict checks flag only writes made by
    /// someone else.
    pub fn record_write(
        &self,
        holder: &InstanceId,
        path: impl AsRef<Path>,
    ) -> Result<RenewOutcome> {
        self.refresh(holder, path, &Refresh::LeaseAndFingerprint)
    }

    fn refresh(
        &self,
        holder: &InstanceId,
        path: impl AsRef<Path>,
        mode: &Refresh,
    ) -> Result<RenewOutcome> {
        let path = self.resolve(path)?;
        let absolute = path.absolute(&self.shared.project_root);
        let now = self.shared.now();
        let extended = now + self.shared.config.lock_ttl();

        let outcome = self
            .shared
            .store
            .transact(&document(&path), |current: Option<LockRecord>| {
                Ok(match current {
                    None => (
                        Commit::Unchanged,
                        RenewOutcome::NotLocked { path: path.clone() },
                    ),
                    Some(record) if record.holder != *holder => (
                        Commit::Unchanged,
                        RenewOutcome::NotHolder {
                            path: path.clone(),
                            holder: record.holder,
                        },
                    ),
                    Some(record) if record.is_expired(now) => (
                        Commit::Unchanged,
                        RenewOutcome::Expired {
                            path: path.clone(),
                            expired_at: record.expires_at,
                        },
                    ),
                    Some(mut record) => {
                        record.expires_at = record.expires_at.max(extended);
                        record.renewals = record.renewals.saturating_add(1);
                        if matches!(mode, Refresh::LeaseAndFingerprint) {
                            record.fingerprint = Fingerprint::of_file(&absolute)?;
                        }
                        (
                            Commit::Replace(record.clone()),
                            RenewOutcome::Renewed { record },
                        )
                    }
                })
            })?;

        tracing::debug!(path = %path, holder = %holder, ?outcome, "Lease refresh");
        Ok(outcome)
    }

    /// Drop every lock held by `holder` and clear its cached locked set.
    ///
    /// Best-effort per record: a record that cannot be removed is logged and
    /// left for its lease to run out.
    pub fn release_all(&self, holder: &InstanceId) -> Result<Vec<LockPath>> {
        let held = self
            .shared
            .store
            .scan::<LockRecord>(LOCKS_DIR)?
            .into_iter()
            .filter(|(_, record)| record.holder == *holder);

        let mut released = Vec::new();
        for (doc, record) in held {
            let result = self.shared.store.transact(&doc, |current: Option<LockRecord>| {
                Ok(match current {
                    Some(current) if current.holder == *holder => (Commit::Remove, true),
                    _ => (Commit::Unchanged, false),
                })
            });
            match result {
                Ok(true) => released.push(record.path),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %record.path, holder = %holder, error = %e, "Failed to release lock");
                }
            }
        }

        if let Err(e) = InstanceRegistry::new(self.shared).clear_locked_paths(holder) {
            tracing::warn!(holder = %holder, error = %e, "Failed to clear locked-path cache");
        }

        if !released.is_empty() {
            tracing::info!(holder = %holder, count = released.len(), "Released all locks");
        }
        Ok(released)
    }

    /// Compare the file's current content with the fingerprint on its lock.
    pub fn check_conflict(&self, path: impl AsRef<Path>) -> Result<ConflictCheck> {
        let path = self.resolve(path)?;
        let Some(record) = self.lock_state(&path)? else {
            return Ok(ConflictCheck::Unlocked { path });
        };

        let actual = Fingerprint::of_file(&path.absolute(&self.shared.project_root))?;
        if actual == record.fingerprint {
            Ok(ConflictCheck::Clean {
                path,
                holder: record.holder,
                fingerprint: actual,
            })
        } else {
            tracing::warn!(path = %path, holder = %record.holder, "Out-of-band modification detected");
            Ok(ConflictCheck::Conflict {
                path,
                holder: record.holder,
                expected: record.fingerprint,
                actual,
            })
        }
    }

    /// The valid lock on a path, if any.
    pub fn lock_state(&self, path: &LockPath) -> Result<Option<LockRecord>> {
        let now = self.shared.now();
        Ok(self
            .shared
            .store
            .read::<LockRecord>(&document(path))?
            .filter(|record| !record.is_expired(now)))
    }

    /// Every valid lock, ordered by path.
    pub fn list_locks(&self) -> Result<Vec<LockRecord>> {
        let now = self.shared.now();
        let mut records: Vec<LockRecord> = self
            .shared
            .store
            .scan::<LockRecord>(LOCKS_DIR)?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| !record.is_expired(now))
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    /// Keep the registry's derived locked set in step; the lock record is
    /// already committed, so a failure here only leaves the cache stale.
    fn mirror(&self, holder: &InstanceId, path: &LockPath, locked: bool) {
        if let Err(e) = InstanceRegistry::new(self.shared).mirror_locked_path(holder, path, locked)
        {
            tracing::warn!(holder = %holder, path = %path, error = %e, "Locked-path cache update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{testing::Fixture, Error};

    fn expect_granted(outcome: AcquireOutcome) -> Result<(LockRecord, bool)> {
        match outcome {
            AcquireOutcome::Granted { record, renewed } => Ok((record, renewed)),
            other => Err(Error::Unknown(format!("expected grant, got {other:?}"))),
        }
    }

    #[test]
    fn test_acquire_grants_with_ttl_and_fingerprint() -> Result<()> {
        let fx = Fixture::new()?;
        fx.write("src/lib.rs", "fn main() {}")?;
        let a = fx.id("a")?;

        let (record, renewed) = expect_granted(fx.coordinator.locks().acquire(&a, "src/lib.rs", "refactor")?)?;

        assert!(!renewed);
        assert_eq!(record.expires_at - record.acquired_at, Duration::seconds(300));
        assert!(record.fingerprint.as_str().starts_with("sha256:"));
        assert_eq!(record.intent, "refactor");
        Ok(())
    }

    #[test]
    fn test_missing_file_gets_absent_fingerprint() -> Result<()> {
        let fx = Fixture::new()?;
        let a = fx.id("a")?;
        let (record, _) = expect_granted(fx.coordinator.locks().acquire(&a, "new.rs", "create")?)?;
        assert!(record.fingerprint.is_absent());
        Ok(())
    }

    #[test]
    fn test_second_holder_is_refused() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();
        locks.acquire(&a, "f.rs", "edit")?;

        let outcome = locks.acquire(&b, "f.rs", "edit")?;

        let issue = outcome.issue().ok_or_else(|| Error::Unknown("no issue".into()))?;
        assert_eq!(issue.code(), "LOCK_HELD");
        let message = issue.to_string();
        assert!(message.contains("locked by a"));
        assert!(message.contains("2024-03-14T09:05:00Z"));
        Ok(())
    }

    #[test]
    fn test_reacquire_renews_without_touching_fingerprint() -> Result<()> {
        let fx = Fixture::new()?;
        fx.write("f.rs", "v1")?;
        let a = fx.id("a")?;
        let locks = fx.coordinator.locks();
        let (first, _) = expect_granted(locks.acquire(&a, "f.rs", "edit")?)?;

        fx.write("f.rs", "v2")?;
        fx.clock.advance(Duration::seconds(100));
        let (second, renewed) = expect_granted(locks.acquire(&a, "f.rs", "")?)?;

        assert!(renewed);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.acquired_at, first.acquired_at);
        assert_eq!(second.expires_at, fx.clock_now() + Duration::seconds(300));
        assert_eq!(second.intent, "edit");
        assert_eq!(second.renewals, 1);
        Ok(())
    }

    #[test]
    fn test_expired_lock_is_cleared_then_granted() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();
        locks.acquire(&a, "f.rs", "edit")?;

        fx.clock.advance(Duration::seconds(301));
        let outcome = locks.acquire(&b, "f.rs", "edit")?;
        assert!(matches!(
            outcome,
            AcquireOutcome::ExpiredAndRetry { ref previous_holder, .. } if *previous_holder == a
        ));
        assert_eq!(outcome.issue().map(|i| i.code()), Some("LOCK_EXPIRED"));

        let (record, renewed) = expect_granted(locks.acquire(&b, "f.rs", "edit")?)?;
        assert_eq!(record.holder, b);
        assert!(!renewed);
        Ok(())
    }

    #[test]
    fn test_very_long_path_can_be_locked() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let deep: String = (0..20).map(|i| format!("segment_dir_{i:02}/")).collect();
        let path = format!("{deep}file.rs");
        assert!(path.len() > 255);
        fx.write(&path, "content")?;
        let locks = fx.coordinator.locks();

        let (record, _) = expect_granted(locks.acquire(&a, &path, "edit")?)?;
        assert_eq!(record.path.as_str(), path);
        assert!(matches!(locks.acquire(&b, &path, "edit")?, AcquireOutcome::HeldByOther { .. }));
        assert!(matches!(locks.check_conflict(&path)?, ConflictCheck::Clean { .. }));
        assert_eq!(locks.list_locks()?.len(), 1);
        assert_eq!(locks.release_all(&a)?, vec![record.path]);
        Ok(())
    }

    #[test]
    fn test_lease_is_still_held_at_exact_expiry() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();
        let (record, _) = expect_granted(locks.acquire(&a, "f.rs", "edit")?)?;

        fx.clock.advance(Duration::seconds(300));
        assert_eq!(fx.clock_now(), record.expires_at);

        assert!(matches!(
            locks.acquire(&b, "f.rs", "edit")?,
            AcquireOutcome::HeldByOther { ref holder, .. } if *holder == a
        ));
        assert!(locks.renew(&a, "f.rs")?.is_renewed());
        Ok(())
    }

    #[test]
    fn test_release_only_by_holder() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();
        locks.acquire(&a, "f.rs", "edit")?;

        let denied = locks.release(&b, "f.rs")?;
        assert_eq!(
            denied.issue(&b).map(|i| i.code()),
            Some("NOT_HOLDER")
        );
        assert!(locks.lock_state(&locks.resolve("f.rs")?)?.is_some());

        assert!(locks.release(&a, "f.rs")?.is_released());
        assert!(matches!(
            locks.release(&a, "f.rs")?,
            ReleaseOutcome::NotLocked { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_renew_is_monotonic() -> Result<()> {
        let mut config = crate::config::CoordinationConfig::default();
        config.locks.ttl_secs = 600;
        let fx = Fixture::with_config(config)?;
        let a = fx.id("a")?;
        let locks = fx.coordinator.locks();
        let (record, _) = expect_granted(locks.acquire(&a, "f.rs", "edit")?)?;

        fx.clock.advance(Duration::seconds(60));
        let RenewOutcome::Renewed { record: renewed } = locks.renew(&a, "f.rs")? else {
            return Err(Error::Unknown("renew failed".into()));
        };

        assert!(renewed.expires_at >= record.expires_at);
        assert_eq!(renewed.expires_at, fx.clock_now() + Duration::seconds(600));
        Ok(())
    }

    #[test]
    fn test_renew_rejections() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();

        assert!(matches!(locks.renew(&a, "f.rs")?, RenewOutcome::NotLocked { .. }));
        locks.acquire(&a, "f.rs", "edit")?;
        assert!(matches!(locks.renew(&b, "f.rs")?, RenewOutcome::NotHolder { .. }));

        fx.clock.advance(Duration::seconds(301));
        let expired = locks.renew(&a, "f.rs")?;
        assert!(matches!(expired, RenewOutcome::Expired { .. }));
        assert_eq!(expired.issue(&a).map(|i| i.code()), Some("LOCK_EXPIRED"));
        Ok(())
    }

    #[test]
    fn test_conflict_detection_and_record_write() -> Result<()> {
        let fx = Fixture::new()?;
        fx.write("f.rs", "original")?;
        let a = fx.id("a")?;
        let locks = fx.coordinator.locks();

        assert!(matches!(locks.check_conflict("f.rs")?, ConflictCheck::Unlocked { .. }));
        locks.acquire(&a, "f.rs", "edit")?;
        assert!(matches!(locks.check_conflict("f.rs")?, ConflictCheck::Clean { .. }));

        fx.write("f.rs", "own edit")?;
        assert!(locks.record_write(&a, "f.rs")?.is_renewed());
        assert!(matches!(locks.check_conflict("f.rs")?, ConflictCheck::Clean { .. }));

        fx.write("f.rs", "someone else")?;
        let check = locks.check_conflict("f.rs")?;
        assert_eq!(check.issue().map(|i| i.code()), Some("CONFLICT_DETECTED"));
        Ok(())
    }

    #[test]
    fn test_list_locks_hides_expired() -> Result<()> {
        let fx = Fixture::new()?;
        let a = fx.id("a")?;
        let locks = fx.coordinator.locks();
        locks.acquire(&a, "b.rs", "edit")?;
        fx.clock.advance(Duration::seconds(200));
        locks.acquire(&a, "a.rs", "edit")?;

        let paths: Vec<String> = locks.list_locks()?.into_iter().map(|r| r.path.to_string()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);

        fx.clock.advance(Duration::seconds(150));
        let paths: Vec<String> = locks.list_locks()?.into_iter().map(|r| r.path.to_string()).collect();
        assert_eq!(paths, vec!["a.rs"]);
        Ok(())
    }

    #[test]
    fn test_release_all_only_touches_own_locks() -> Result<()> {
        let fx = Fixture::new()?;
        let (a, b) = (fx.id("a")?, fx.id("b")?);
        let locks = fx.coordinator.locks();
        locks.acquire(&a, "1.rs", "edit")?;
        locks.acquire(&a, "2.rs", "edit")?;
        locks.acquire(&b, "3.rs", "edit")?;

        let released = locks.release_all(&a)?;

        assert_eq!(released.len(), 2);
        let remaining: Vec<InstanceId> = locks.list_locks()?.into_iter().map(|r| r.holder).collect();
        assert_eq!(remaining, vec![b]);
        Ok(())
    }

    #[test]
    fn test_outcomes_serialize_with_status_tag() -> Result<()> {
        let fx = Fixture::new()?;
        let a = fx.id("a")?;
        let outcome = fx.coordinator.locks().release(&a, "nothing.rs")?;

        let json = serde_json::to_value(&outcome)?;
        assert_eq!(json["status"], "not_locked");
        assert_eq!(json["path"], "nothing.rs");
        Ok(())
    }
}
