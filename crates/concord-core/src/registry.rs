//! Instance registry.
//!
//! `registry.json` maps instance ids to their metadata. The `locked_paths` set
//! on each entry is a cache derived from the lock records; the records are
//! authoritative and [`InstanceRegistry::rebuild_locked_paths`] recomputes the
//! cache from them.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    coordinator::Shared,
    heartbeat::HeartbeatMonitor,
    identity::InstanceId,
    locks::LockManager,
    paths::LockPath,
    store::{Commit, REGISTRY_DOC},
    sweep::{self, SweepReport},
    Error, Result,
};

const MAX_ID_ATTEMPTS: usize = 8;

/// Lifecycle status of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Active,
    Stale,
    Terminated,
}

/// A registered instance and where it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub pid: u32,
    pub host: String,
    pub user: String,
    pub os: String,
    pub worktree: String,
    pub branch: Option<String>,
    pub task: String,
    pub role: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub locked_paths: BTreeSet<LockPath>,
}

/// On-disk shape of `registry.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, Instance>,
}

/// Result of [`InstanceRegistry::unregister`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unregistration {
    pub instance_id: InstanceId,
    /// Whether a heartbeat record or registry entry existed
    pub removed: bool,
    pub released_paths: Vec<LockPath>,
}

/// Registration and lookup of instances.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRegistry<'a> {
    shared: &'a Shared,
}

impl<'a> InstanceRegistry<'a> {
    pub(crate) const fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Register this process under a freshly generated id.
    ///
    /// The heartbeat record is created first and only if absent; on the
    /// (unlikely) collision a new id is drawn.
    pub fn register(&self, task: &str, role: &str) -> Result<Instance> {
        let heartbeats = HeartbeatMonitor::new(self.shared);
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = InstanceId::generate(self.shared.now());
            if heartbeats.start(&id)? {
                return self.insert(id, task, role);
            }
            tracing::debug!(instance = %id, attempt, "Instance id collision, drawing another");
        }
        Err(Error::Unknown(format!(
            "Could not allocate a unique instance id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    /// Register under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// `ValidationError` if an instance with this id is alive (has a
    /// heartbeat record).
    pub fn register_as(&self, id: &InstanceId, task: &str, role: &str) -> Result<Instance> {
        if !HeartbeatMonitor::new(self.shared).start(id)? {
            return Err(Error::validation(
                format!("Instance '{id}' is already registered"),
                "instance_id",
                Some(id.to_string()),
                "not registered",
            ));
        }
        self.insert(id.clone(), task, role)
    }

    fn insert(&self, id: InstanceId, task: &str, role: &str) -> Result<Instance> {
        let now = self.shared.now();
        let root = &self.shared.project_root;
        let instance = Instance {
            id: id.clone(),
            pid: std::process::id(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            user: current_user(),
            os: std::env::consts::OS.to_string(),
            worktree: root.display().to_string(),
            branch: detect_branch(root),
            task: task.to_string(),
            role: role.to_string(),
            registered_at: now,
            last_heartbeat: now,
            status: InstanceStatus::Starting,
            locked_paths: BTreeSet::new(),
        };

        let stored = instance.clone();
        self.shared
            .store
            .update(REGISTRY_DOC, move |doc: &mut RegistryDocument| {
                doc.instances.insert(id, stored);
            })?;

        tracing::info!(
            instance = %instance.id,
            pid = instance.pid,
            host = %instance.host,
            role = %instance.role,
            "Registered instance"
        );
        Ok(instance)
    }

    /// Remove an instance: heartbeat record, registry entry, and every lock
    /// it holds.
    pub fn unregister(&self, id: &InstanceId) -> Result<Unregistration> {
        let had_heartbeat = HeartbeatMonitor::new(self.shared).remove(id)?;
        let had_entry = self.remove_entry(id)?.is_some();
        let released_paths = LockManager::new(self.shared).release_all(id)?;

        tracing::info!(
            instance = %id,
            released = released_paths.len(),
            "Unregistered instance"
        );
        Ok(Unregistration {
            instance_id: id.clone(),
            removed: had_heartbeat || had_entry,
            released_paths,
        })
    }

    /// Ping on behalf of `id` and mirror the ping into its registry entry.
    ///
    /// Returns `None` if the instance has no heartbeat record; it was never
    /// registered or has been reclaimed, and should register again.
    pub fn heartbeat(&self, id: &InstanceId) -> Result<Option<Instance>> {
        let Some(record) = HeartbeatMonitor::new(self.shared).ping(id)? else {
            tracing::debug!(instance = %id, "Heartbeat for unknown instance");
            return Ok(None);
        };

        self.shared
            .store
            .transact(REGISTRY_DOC, |doc: Option<RegistryDocument>| {
                let mut doc = doc.unwrap_or_default();
                let Some(entry) = doc.instances.get_mut(id) else {
                    return Ok((Commit::Unchanged, None));
                };
                entry.last_heartbeat = record.last_ping;
                entry.status = InstanceStatus::Active;
                let updated = entry.clone();
                Ok((Commit::Replace(doc), Some(updated)))
            })
    }

    /// Reclaim stale instances, returning how many were removed.
    pub fn cleanup_stale(&self) -> Result<usize> {
        Ok(self.sweep()?.reclaimed.len())
    }

    /// Reclaim stale instances with per-instance detail.
    pub fn sweep(&self) -> Result<SweepReport> {
        sweep::reclaim_stale(self.shared)
    }

    /// Sweep, then list every remaining entry.
    ///
    /// A failed sweep is logged and the listing proceeds.
    pub fn list_active(&self) -> Result<Vec<Instance>> {
        if let Err(e) = self.sweep() {
            tracing::warn!(error = %e, "Staleness sweep failed before listing");
        }
        Ok(self.read()?.instances.into_values().collect())
    }

    pub fn get(&self, id: &InstanceId) -> Result<Option<Instance>> {
        Ok(self.read()?.instances.remove(id))
    }

    /// Recompute every entry's locked set from the current lock records.
    ///
    /// Returns the number of entries whose set changed.
    pub fn rebuild_locked_paths(&self) -> Result<usize> {
        let mut held: BTreeMap<InstanceId, BTreeSet<LockPath>> = BTreeMap::new();
        for record in LockManager::new(self.shared).list_locks()? {
            held.entry(record.holder).or_default().insert(record.path);
        }

        let changed = self
            .shared
            .store
            .transact(REGISTRY_DOC, |doc: Option<RegistryDocument>| {
                let mut doc = doc.unwrap_or_default();
                let changed = doc
                    .instances
                    .values_mut()
                    .filter_map(|entry| {
                        let derived = held.remove(&entry.id).unwrap_or_default();
                        (entry.locked_paths != derived).then(|| {
                            entry.locked_paths = derived;
                        })
                    })
                    .count();
                let commit = if changed == 0 {
                    Commit::Unchanged
                } else {
                    Commit::Replace(doc)
                };
                Ok((commit, changed))
            })?;

        tracing::debug!(changed, "Rebuilt locked-path cache");
        Ok(changed)
    }

    pub(crate) fn read(&self) -> Result<RegistryDocument> {
        Ok(self
            .shared
            .store
            .read::<RegistryDocument>(REGISTRY_DOC)?
            .unwrap_or_default())
    }

    pub(crate) fn remove_entry(&self, id: &InstanceId) -> Result<Option<Instance>> {
        self.shared
            .store
            .transact(REGISTRY_DOC, |doc: Option<RegistryDocument>| {
                let mut doc = doc.unwrap_or_default();
                Ok(match doc.instances.remove(id) {
                    Some(removed) => (Commit::Replace(doc), Some(removed)),
                    None => (Commit::Unchanged, None),
                })
            })
    }

    /// Add or drop `path` in the holder's cached locked set.
    ///
    /// Holders without a registry entry are ignored.
    pub(crate) fn mirror_locked_path(
        &self,
        id: &InstanceId,
        path: &LockPath,
        locked: bool,
    ) -> Result<()> {
        self.shared
            .store
            .transact(REGISTRY_DOC, |doc: Option<RegistryDocument>| {
                let mut doc = doc.unwrap_or_default();
                let changed = doc.instances.get_mut(id).is_some_and(|entry| {
                    if locked {
                        entry.locked_paths.insert(path.clone())
                    } else {
                        entry.locked_paths.remove(path)
                    }
                });
                let commit = if changed {
                    Commit::Replace(doc)
                } else {
                    Commit::Unchanged
                };
                Ok((commit, ()))
            })
    }

    pub(crate) fn clear_locked_paths(&self, id: &InstanceId) -> Result<()> {
        self.shared
            .store
            .transact(REGISTRY_DOC, |doc: Option<RegistryDocument>| {
                let mut doc = doc.unwrap_or_default();
                let changed = doc
                    .instances
                    .get_mut(id)
                    .is_some_and(|entry| !std::mem::take(&mut entry.locked_paths).is_empty());
                let commit = if changed {
                    Commit::Replace(doc)
                } else {
                    Commit::Unchanged
                };
                Ok((commit, ()))
            })
    }
}

fn current_user() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Current branch of the git checkout at `root`, if any.
///
/// Reads `HEAD` directly; a linked worktree's `.git` file is followed to its
/// git directory. Detached heads report no branch.
fn detect_branch(root: &Path) -> Option<String> {
    let dot_git = root.join(".git");
    let git_dir = if dot_git.is_file() {
        let pointer = std::fs::read_to_string(&dot_git).ok()?;
        let target = pointer.trim().strip_prefix("gitdir:")?.trim().to_string();
        let target = Path::new(&target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            root.join(target)
        }
    } else {
        dot_git
    };

    let head = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
}
