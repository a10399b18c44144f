//! Heartbeat records.
//!
//! Each instance owns one small document, `heartbeats/<id>.json`, so pings
//! from different instances never contend for the same advisory lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    coordinator::Shared,
    identity::InstanceId,
    store::{Commit, HEARTBEATS_DIR},
    Result,
};

/// Liveness phase recorded in a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeartbeatStatus {
    /// Registered, not yet pinged
    Starting,
    /// Pinged at least once
    Active,
}

/// Last sign of life from an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub instance_id: InstanceId,
    pub last_ping: DateTime<Utc>,
    pub ping_count: u64,
    pub status: HeartbeatStatus,
}

impl HeartbeatRecord {
    /// Seconds since the last ping.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_ping).num_seconds()
    }
}

/// Reads and writes heartbeat records.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor<'a> {
    shared: &'a Shared,
}

pub(crate) fn document(id: &InstanceId) -> String {
    format!("{HEARTBEATS_DIR}/{id}.json")
}

impl<'a> HeartbeatMonitor<'a> {
    pub(crate) const fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Create the record for a new instance.
    ///
    /// Returns `false` without touching anything if a record for `id` already
    /// exists.
    pub fn start(&self, id: &InstanceId) -> Result<bool> {
        let now = self.shared.now();
        self.shared
            .store
            .transact(&document(id), |current: Option<HeartbeatRecord>| {
                if current.is_some() {
                    return Ok((Commit::Unchanged, false));
                }
                let record = HeartbeatRecord {
                    instance_id: id.clone(),
                    last_ping: now,
                    ping_count: 0,
                    status: HeartbeatStatus::Starting,
                };
                Ok((Commit::Replace(record), true))
            })
    }

    /// Record a ping.
    ///
    /// Returns `None` if the instance has no record, either because it never
    /// registered or because it was reclaimed as stale. The caller should
    /// register again.
    pub fn ping(&self, id: &InstanceId) -> Result<Option<HeartbeatRecord>> {
        let now = self.shared.now();
        self.shared
            .store
            .transact(&document(id), |current: Option<HeartbeatRecord>| {
                let Some(mut record) = current else {
                    return Ok((Commit::Unchanged, None));
                };
                record.last_ping = now;
                record.ping_count = record.ping_count.saturating_add(1);
                record.status = HeartbeatStatus::Active;
                Ok((Commit::Replace(record.clone()), Some(record)))
            })
    }

    /// Delete an instance's record. Returns whether one existed.
    pub fn remove(&self, id: &InstanceId) -> Result<bool> {
        self.shared
            .store
            .transact(&document(id), |current: Option<HeartbeatRecord>| {
                Ok((Commit::Remove, current.is_some()))
            })
    }

    /// Delete the record only if it is still stale under the document lock.
    ///
    /// A ping that lands between a scan and this call wins.
    pub(crate) fn remove_if_stale(&self, id: &InstanceId) -> Result<Option<HeartbeatRecord>> {
        let now = self.shared.now();
        let timeout = self.shared.config.heartbeat_timeout();
        self.shared
            .store
            .transact(&document(id), |current: Option<HeartbeatRecord>| {
                Ok(match current {
                    Some(record) if now - record.last_ping > timeout => {
                        (Commit::Remove, Some(record))
                    }
                    _ => (Commit::Unchanged, None),
                })
            })
    }

    pub fn get(&self, id: &InstanceId) -> Result<Option<HeartbeatRecord>> {
        self.shared.store.read(&document(id))
    }

    /// All readable heartbeat records.
    pub fn scan(&self) -> Result<Vec<HeartbeatRecord>> {
        Ok(self
            .shared
            .store
            .scan::<HeartbeatRecord>(HEARTBEATS_DIR)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Whether `record` is past the liveness timeout at `now`.
    #[must_use]
    pub fn is_stale(&self, record: &HeartbeatRecord, now: DateTime<Utc>) -> bool {
        now - record.last_ping > self.shared.config.heartbeat_timeout()
    }
}
