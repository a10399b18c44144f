//! Staleness sweep.
//!
//! An instance whose last ping is older than the heartbeat timeout is dead.
//! The sweep deletes its heartbeat record (re-checking age under the document
//! lock, so a concurrent ping wins), removes its registry entry and releases
//! every lock it holds. Registry entries left without a heartbeat record by a
//! crash mid-cleanup are reclaimed the same way once their own
//! `last_heartbeat` is past the timeout.
//!
//! The sweep is best-effort and idempotent: a second run right after the
//! first finds nothing to do.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    coordinator::Shared,
    heartbeat::HeartbeatMonitor,
    identity::InstanceId,
    locks::LockManager,
    paths::LockPath,
    registry::InstanceRegistry,
    Result,
};

/// One reclaimed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleReclaim {
    pub instance_id: InstanceId,
    pub last_seen: DateTime<Utc>,
    pub age_secs: i64,
    pub released: Vec<LockPath>,
    /// Reclaimed from a registry entry that had lost its heartbeat record
    pub orphaned: bool,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reclaimed: Vec<StaleReclaim>,
    /// Instances stale at scan time that pinged before they could be reclaimed
    pub refreshed: usize,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty()
    }
}

pub(crate) fn reclaim_stale(shared: &Shared) -> Result<SweepReport> {
    let heartbeats = HeartbeatMonitor::new(shared);
    let registry = InstanceRegistry::new(shared);
    let locks = LockManager::new(shared);
    let mut report = SweepReport::default();

    let records = heartbeats.scan()?;
    let scan_time = shared.now();
    let known: BTreeSet<InstanceId> = records.iter().map(|r| r.instance_id.clone()).collect();

    for record in records
        .into_iter()
        .filter(|r| heartbeats.is_stale(r, scan_time))
    {
        let removed = match heartbeats.remove_if_stale(&record.instance_id) {
            Ok(Some(removed)) => removed,
            Ok(None) => {
                report.refreshed += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(instance = %record.instance_id, error = %e, "Skipping stale instance");
                continue;
            }
        };
        if let Err(e) = registry.remove_entry(&removed.instance_id) {
            // the heartbeat is gone, so a later sweep treats the entry as an orphan
            tracing::warn!(instance = %removed.instance_id, error = %e, "Failed to remove registry entry");
            continue;
        }
        let released = release_or_warn(&locks, &removed.instance_id);
        let age_secs = removed.age_secs(shared.now());

        tracing::warn!(
            instance = %removed.instance_id,
            last_ping = %removed.last_ping,
            age_secs,
            released = released.len(),
            "Reclaimed stale instance"
        );
        report.reclaimed.push(StaleReclaim {
            instance_id: removed.instance_id,
            last_seen: removed.last_ping,
            age_secs,
            released,
            orphaned: false,
        });
    }

    let timeout = shared.config.heartbeat_timeout();
    let orphans: Vec<InstanceId> = match registry.read() {
        Ok(doc) => doc
            .instances
            .into_values()
            .filter(|entry| {
                !known.contains(&entry.id) && scan_time - entry.last_heartbeat > timeout
            })
            .map(|entry| entry.id)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Registry unreadable; skipping orphan reclamation");
            Vec::new()
        }
    };

    for id in orphans {
        match heartbeats.get(&id) {
            Ok(None) => {}
            // registered after the scan
            Ok(Some(_)) => continue,
            Err(e) => {
                tracing::warn!(instance = %id, error = %e, "Unreadable heartbeat record; leaving entry");
                continue;
            }
        }
        let entry = match registry.remove_entry(&id) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(instance = %id, error = %e, "Failed to remove orphaned entry");
                continue;
            }
        };
        let released = release_or_warn(&locks, &id);
        let age_secs = (shared.now() - entry.last_heartbeat).num_seconds();

        tracing::warn!(
            instance = %id,
            last_heartbeat = %entry.last_heartbeat,
            age_secs,
            released = released.len(),
            "Reclaimed orphaned registry entry"
        );
        report.reclaimed.push(StaleReclaim {
            instance_id: id,
            last_seen: entry.last_heartbeat,
            age_secs,
            released,
            orphaned: true,
        });
    }

    if report.is_empty() {
        tracing::trace!("Sweep found no stale instances");
    }
    Ok(report)
}

/// Locks left behind expire with their lease.
fn release_or_warn(locks: &LockManager<'_>, id: &InstanceId) -> Vec<LockPath> {
    locks.release_all(id).unwrap_or_else(|e| {
        tracing::warn!(instance = %id, error = %e, "Failed to release locks of reclaimed instance");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::{
        config::CoordinationConfig, locks::AcquireOutcome, testing::Fixture, Error, Result,
    };

    #[test]
    fn test_sweep_reclaims_and_is_idempotent() -> Result<()> {
        let fx = Fixture::new()?;
        let dead = fx.id("dead")?;
        let registry = fx.coordinator.registry();
        registry.register_as(&dead, "t", "r")?;
        fx.coordinator.locks().acquire(&dead, "x.rs", "edit")?;

        fx.clock.advance(Duration::seconds(301));
        let report = fx.coordinator.sweep()?;

        assert_eq!(report.reclaimed.len(), 1);
        assert_eq!(report.reclaimed[0].instance_id, dead);
        assert_eq!(report.reclaimed[0].released.len(), 1);
        assert!(!report.reclaimed[0].orphaned);
        assert!(registry.get(&dead)?.is_none());
        assert!(fx.coordinator.sweep()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_exact_timeout_is_not_stale() -> Result<()> {
        let fx = Fixture::new()?;
        let id = fx.id("edge")?;
        fx.coordinator.registry().register_as(&id, "t", "r")?;

        fx.clock.advance(Duration::seconds(300));
        assert!(fx.coordinator.sweep()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_one_broken_record_does_not_stop_the_sweep() -> Result<()> {
        let fx = Fixture::new()?;
        let (stuck, dead) = (fx.id("a")?, fx.id("b")?);
        let registry = fx.coordinator.registry();
        registry.register_as(&stuck, "t", "r")?;
        registry.register_as(&dead, "t", "r")?;
        fx.coordinator.locks().acquire(&dead, "b.rs", "edit")?;

        let lock_file = fx.coordinator.state_dir().join("heartbeats/a.json.lock");
        std::fs::remove_file(&lock_file)?;
        std::fs::create_dir(&lock_file)?;

        fx.clock.advance(Duration::seconds(301));
        let report = fx.coordinator.sweep()?;

        assert_eq!(report.reclaimed.len(), 1);
        assert_eq!(report.reclaimed[0].instance_id, dead);
        assert_eq!(report.reclaimed[0].released.len(), 1);
        assert!(registry.get(&dead)?.is_none());
        assert!(registry.get(&stuck)?.is_some());
        Ok(())
    }

    #[test]
    fn test_unreadable_heartbeat_keeps_registry_entry() -> Result<()> {
        let fx = Fixture::new()?;
        let id = fx.id("garbled")?;
        fx.coordinator.registry().register_as(&id, "t", "r")?;
        std::fs::write(
            fx.coordinator.state_dir().join("heartbeats/garbled.json"),
            "{ not json",
        )?;

        fx.clock.advance(Duration::seconds(301));
        let report = fx.coordinator.sweep()?;

        assert!(report.is_empty());
        assert!(fx.coordinator.registry().get(&id)?.is_some());
        Ok(())
    }

    #[test]
    fn test_orphaned_entry_is_reclaimed() -> Result<()> {
        let fx = Fixture::new()?;
        let id = fx.id("half-dead")?;
        fx.coordinator.registry().register_as(&id, "t", "r")?;
        fx.coordinator.heartbeats().remove(&id)?;

        fx.clock.advance(Duration::seconds(301));
        let report = fx.coordinator.sweep()?;

        assert_eq!(report.reclaimed.len(), 1);
        assert!(report.reclaimed[0].orphaned);
        Ok(())
    }

    #[test]
    fn test_reclaimed_locks_become_available() -> Result<()> {
        // heartbeat times out long before the lease does
        let mut config = CoordinationConfig::default();
        config.locks.ttl_secs = 3600;
        let fx = Fixture::with_config(config)?;
        let dead = fx.id("dead")?;
        let other = fx.id("other")?;
        fx.coordinator.registry().register_as(&dead, "t", "r")?;
        fx.coordinator.locks().acquire(&dead, "shared.rs", "edit")?;

        fx.clock.advance(Duration::seconds(301));

        let outcome = fx.coordinator.locks().acquire(&other, "shared.rs", "edit")?;
        match outcome {
            AcquireOutcome::Granted { renewed, .. } => assert!(!renewed),
            other => return Err(Error::Unknown(format!("unexpected {other:?}"))),
        }
        Ok(())
    }
}
