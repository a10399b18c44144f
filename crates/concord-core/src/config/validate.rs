//! Configuration validation

use super::types::CoordinationConfig;
use crate::{Error, Result};

const MAX_LEASE_SECS: u32 = 7 * 24 * 60 * 60;

impl CoordinationConfig {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or invalid
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.trim().is_empty() {
            return Err(Error::validation(
                "state_dir cannot be empty",
                "state_dir",
                None,
                "non-empty",
            ));
        }

        check_range("locks.ttl_secs", self.locks.ttl_secs, 1, MAX_LEASE_SECS)?;
        check_range(
            "heartbeat.timeout_secs",
            self.heartbeat.timeout_secs,
            1,
            MAX_LEASE_SECS,
        )?;
        check_range(
            "sweep.interval_secs",
            self.sweep.interval_secs,
            1,
            MAX_LEASE_SECS,
        )?;

        if self.store.lock_wait_ms == 0 {
            return Err(Error::validation(
                "store.lock_wait_ms must be at least 1",
                "store.lock_wait_ms",
                Some("0".to_string()),
                ">= 1",
            ));
        }

        if self.store.stale_lock_secs == 0 {
            return Err(Error::validation(
                "store.stale_lock_secs must be at least 1",
                "store.stale_lock_secs",
                Some("0".to_string()),
                ">= 1",
            ));
        }

        if self.store.base_delay_ms > self.store.max_delay_ms {
            return Err(Error::validation(
                format!(
                    "store.base_delay_ms ({}) exceeds store.max_delay_ms ({})",
                    self.store.base_delay_ms, self.store.max_delay_ms
                ),
                "store.base_delay_ms",
                Some(self.store.base_delay_ms.to_string()),
                "<= store.max_delay_ms",
            ));
        }

        Ok(())
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(
            format!("{field} must be {min}-{max}, got {value}"),
            field,
            Some(value.to_string()),
            format!("{min}..={max}"),
        ))
    }
}
