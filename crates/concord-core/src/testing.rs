//! Shared fixtures for unit tests.

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::{
    clock::{Clock, ManualClock},
    config::CoordinationConfig,
    coordinator::Coordinator,
    identity::InstanceId,
    Error, Result,
};

pub(crate) struct Fixture {
    pub(crate) dir: TempDir,
    pub(crate) clock: ManualClock,
    pub(crate) coordinator: Coordinator,
}

impl Fixture {
    pub(crate) fn new() -> Result<Self> {
        Self::with_config(CoordinationConfig::default())
    }

    pub(crate) fn with_config(config: CoordinationConfig) -> Result<Self> {
        let dir = TempDir::new()?;
        let start: DateTime<Utc> = Utc
            .with_ymd_and_hms(2024, 3, 14, 9, 0, 0)
            .single()
            .ok_or_else(|| Error::Unknown("bad fixture time".into()))?;
        let clock = ManualClock::new(start);
        let coordinator = Coordinator::builder(dir.path())
            .config(config)
            .clock(clock.clone())
            .build()?;
        Ok(Self {
            dir,
            clock,
            coordinator,
        })
    }

    pub(crate) fn id(&self, raw: &str) -> Result<InstanceId> {
        InstanceId::parse(raw)
    }

    pub(crate) fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn write(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
