//! Instance identity.
//!
//! An [`InstanceId`] is generated once per process and passed explicitly into
//! every coordination call. It doubles as a file name under `heartbeats/`, so
//! the character set is restricted accordingly.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_ID_LEN: usize = 128;

/// Unique identifier of a running instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh id: `inst-<UTC timestamp>-<pid>-<64 random bits>`.
    ///
    /// The random suffix makes collisions between processes started in the
    /// same second on the same host vanishingly unlikely.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u64 = rand::thread_rng().gen();
        Self(format!(
            "inst-{}-{:x}-{suffix:016x}",
            now.format("%Y%m%dT%H%M%SZ"),
            std::process::id()
        ))
    }

    /// Parse and validate a caller-supplied id.
    ///
    /// # Rules
    ///
    /// - 1 to 128 characters
    /// - letters, digits, `-`, `_` and `.` only
    /// - must not start with `.`
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::validation(
                "Instance id cannot be empty",
                "instance_id",
                None,
                "non-empty",
            ));
        }

        if raw.len() > MAX_ID_LEN {
            return Err(Error::validation(
                format!("Instance id exceeds {MAX_ID_LEN} characters"),
                "instance_id",
                Some(raw.to_string()),
                format!("max length {MAX_ID_LEN}"),
            ));
        }

        if raw.starts_with('.')
            || !raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::validation(
                format!(
                    "Instance id '{raw}' must contain only letters, numbers, hyphens, underscores, or dots"
                ),
                "instance_id",
                Some(raw.to_string()),
                "[A-Za-z0-9._-], no leading dot",
            ));
        }

        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_distinct() -> Result<()> {
        let now = Utc::now();
        let a = InstanceId::generate(now);
        let b = InstanceId::generate(now);

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("inst-"));
        assert_eq!(InstanceId::parse(a.as_str())?, a);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        assert!(InstanceId::parse("").is_err());
        assert!(InstanceId::parse("   ").is_err());
        assert!(InstanceId::parse("a/b").is_err());
        assert!(InstanceId::parse("..").is_err());
        assert!(InstanceId::parse(".hidden").is_err());
        assert!(InstanceId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_parse_accepts_and_trims() -> Result<()> {
        let id = InstanceId::parse("  agent_1.worker-2 ")?;
        assert_eq!(id.as_str(), "agent_1.worker-2");
        Ok(())
    }

    #[test]
    fn test_serializes_as_plain_string() -> Result<()> {
        let id = InstanceId::parse("agent-7")?;
        assert_eq!(serde_json::to_string(&id)?, "\"agent-7\"");
        Ok(())
    }
}
