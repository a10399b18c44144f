//! Coordinator facade.
//!
//! A [`Coordinator`] binds one project root, one store, one clock and one
//! configuration. The component views it hands out borrow that shared state;
//! they are cheap and carry no state of their own.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};

use crate::{
    clock::{Clock, WallClock},
    config::{load_config, CoordinationConfig},
    decisions::DecisionLog,
    heartbeat::HeartbeatMonitor,
    locks::LockManager,
    registry::InstanceRegistry,
    store::CoordinationStore,
    sweep::{self, SweepReport},
    Error, Result,
};

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) store: CoordinationStore,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: CoordinationConfig,
    pub(crate) project_root: PathBuf,
}

impl Shared {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Entry point to every coordination operation for one project.
#[derive(Debug, Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Open the coordinator for `project_root` with layered configuration and
    /// the wall clock.
    pub fn open(project_root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(project_root).build()
    }

    #[must_use]
    pub fn builder(project_root: impl Into<PathBuf>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            project_root: project_root.into(),
            config: None,
            clock: None,
        }
    }

    #[must_use]
    pub fn registry(&self) -> InstanceRegistry<'_> {
        InstanceRegistry::new(&self.shared)
    }

    #[must_use]
    pub fn heartbeats(&self) -> HeartbeatMonitor<'_> {
        HeartbeatMonitor::new(&self.shared)
    }

    #[must_use]
    pub fn locks(&self) -> LockManager<'_> {
        LockManager::new(&self.shared)
    }

    #[must_use]
    pub fn decisions(&self) -> DecisionLog<'_> {
        DecisionLog::new(&self.shared)
    }

    /// Run one staleness sweep.
    pub fn sweep(&self) -> Result<SweepReport> {
        sweep::reclaim_stale(&self.shared)
    }

    #[must_use]
    pub fn config(&self) -> &CoordinationConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.shared.project_root
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        self.shared.store.root()
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.shared.now()
    }
}

/// Builder for [`Coordinator`].
#[derive(Debug)]
pub struct CoordinatorBuilder {
    project_root: PathBuf,
    config: Option<CoordinationConfig>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoordinatorBuilder {
    /// Use `config` instead of loading the layered configuration.
    #[must_use]
    pub fn config(mut self, config: CoordinationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `clock` instead of the wall clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let project_root = std::path::absolute(&self.project_root).map_err(|e| {
            Error::IoError(format!(
                "Failed to resolve project root '{}': {e}",
                self.project_root.display()
            ))
        })?;

        if !project_root.is_dir() {
            return Err(Error::NotFound(format!(
                "Project root '{}' is not a directory",
                project_root.display()
            )));
        }

        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => load_config(&project_root)?,
        };

        let store =
            CoordinationStore::open(config.state_path(&project_root), config.lock_options())?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(WallClock));

        tracing::debug!(
            root = %project_root.display(),
            state_dir = %store.root().display(),
            "Opened coordinator"
        );

        Ok(Coordinator {
            shared: Arc::new(Shared {
                store,
                clock,
                config,
                project_root,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_build_creates_state_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let coordinator = Coordinator::builder(dir.path())
            .config(CoordinationConfig::default())
            .clock(ManualClock::default())
            .build()?;

        assert!(coordinator.state_dir().ends_with(".concord"));
        assert!(coordinator.state_dir().is_dir());
        Ok(())
    }

    #[test]
    fn test_build_rejects_missing_root() {
        let result = Coordinator::builder("/definitely/not/here/concord")
            .config(CoordinationConfig::default())
            .build();
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_build_validates_explicit_config() -> Result<()> {
        let dir = TempDir::new()?;
        let mut config = CoordinationConfig::default();
        config.locks.ttl_secs = 0;

        let result = Coordinator::builder(dir.path()).config(config).build();
        assert!(matches!(result, Err(Error::ValidationError { .. })));
        Ok(())
    }
}
