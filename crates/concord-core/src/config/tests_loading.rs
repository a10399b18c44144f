//! Loading, merging and validation tests for configuration

#[cfg(test)]
mod loading_tests {
    use std::path::Path;

    use tempfile::TempDir;

    use crate::{
        config::{load_config_from, load_toml_file, CoordinationConfig, SweepPolicy},
        Error, Result,
    };

    fn write_project_config(root: &Path, body: &str) -> Result<()> {
        let dir = root.join(".concord");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("config.toml"), body)?;
        Ok(())
    }

    #[test]
    fn test_no_config_files_returns_defaults() -> Result<()> {
        let root = TempDir::new()?;
        let config = load_config_from(root.path(), None)?;

        assert_eq!(config, CoordinationConfig::default());
        assert_eq!(config.locks.ttl_secs, 300);
        assert_eq!(config.heartbeat.timeout_secs, 300);
        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.sweep.policy, SweepPolicy::Opportunistic);
        assert_eq!(config.state_dir, ".concord");
        Ok(())
    }

    #[test]
    fn test_project_overrides_global_key_by_key() -> Result<()> {
        let root = TempDir::new()?;
        let global_dir = TempDir::new()?;
        let global = global_dir.path().join("config.toml");
        std::fs::write(
            &global,
            "[locks]\nttl_secs = 120\n\n[sweep]\npolicy = \"both\"\n",
        )?;
        write_project_config(root.path(), "[locks]\nttl_secs = 600\n")?;

        let config = load_config_from(root.path(), Some(&global))?;

        assert_eq!(config.locks.ttl_secs, 600);
        assert_eq!(config.sweep.policy, SweepPolicy::Both);
        assert_eq!(config.heartbeat.timeout_secs, 300);
        Ok(())
    }

    #[test]
    fn test_unknown_keys_are_rejected() -> Result<()> {
        let root = TempDir::new()?;
        write_project_config(root.path(), "[locks]\nttl = 10\n")?;

        let result = load_config_from(root.path(), None);
        assert!(matches!(result, Err(Error::ParseError(_))));
        Ok(())
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "state_dir = \n invalid toml [[[")?;

        let result = load_toml_file(&path);
        assert!(matches!(result, Err(Error::ParseError(_))));
        Ok(())
    }

    #[test]
    fn test_oversized_file_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("big.toml");
        std::fs::write(&path, format!("# {}\n", "x".repeat(1024 * 1024)))?;

        let result = load_toml_file(&path);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("real.toml");
        let link = dir.path().join("link.toml");
        std::fs::write(&target, "[locks]\nttl_secs = 10\n")?;
        std::os::unix::fs::symlink(&target, &link)?;

        let result = load_toml_file(&link);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn test_validation_rejects_zero_ttl() -> Result<()> {
        let root = TempDir::new()?;
        write_project_config(root.path(), "[locks]\nttl_secs = 0\n")?;

        let result = load_config_from(root.path(), None);
        assert!(matches!(result, Err(Error::ValidationError { .. })));
        Ok(())
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let mut config = CoordinationConfig::default();
        config.store.base_delay_ms = 500;
        config.store.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_policy_parses_case_insensitively() -> Result<()> {
        use std::str::FromStr;

        assert_eq!(
            SweepPolicy::from_str("SCHEDULED").map_err(|e| Error::ParseError(e.to_string()))?,
            SweepPolicy::Scheduled
        );
        assert!(SweepPolicy::from_str("sometimes").is_err());
        assert!(SweepPolicy::Both.sweeps_on_acquire());
        assert!(!SweepPolicy::Scheduled.sweeps_on_acquire());
        assert!(SweepPolicy::Scheduled.runs_scheduled());
        Ok(())
    }

    #[test]
    fn test_state_path_relative_and_absolute() {
        let mut config = CoordinationConfig::default();
        let root = Path::new("/work/project");
        assert_eq!(config.state_path(root), root.join(".concord"));

        config.state_dir = "/var/lib/concord".to_string();
        assert_eq!(config.state_path(root), Path::new("/var/lib/concord"));
    }

    #[test]
    fn test_durations_follow_config() {
        let config = CoordinationConfig::default();
        assert_eq!(config.lock_ttl(), chrono::Duration::seconds(300));
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(60));
        assert_eq!(config.lock_options().max_wait_ms, 10_000);
    }
}
