//! Command implementations
//!
//! Every command opens its own [`Coordinator`] on the project root and runs
//! the blocking store work on tokio's blocking pool.

pub mod decision;
pub mod instance;
pub mod lock;
pub mod sweep;

use std::path::PathBuf;

use anyhow::Result;
use concord_core::{Coordinator, Error, InstanceId};

use crate::cli::output::OutputFormat;

/// Environment variable naming the calling instance.
pub const INSTANCE_ENV: &str = "CONCORD_INSTANCE_ID";

/// How a command ended when it did not fail.
///
/// Contention (a held lock, a conflict, a denied gate) is not an error, but
/// callers scripting around the CLI still need to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Command line could not be parsed
    Usage,
    Denied,
}

impl Outcome {
    pub const fn from_granted(granted: bool) -> Self {
        if granted {
            Self::Success
        } else {
            Self::Denied
        }
    }

    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Usage => 2,
            Self::Denied => 5,
        }
    }
}

/// Arguments shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub format: OutputFormat,
    pub instance: Option<String>,
}

impl Context {
    /// The calling instance, from `--instance` or `$CONCORD_INSTANCE_ID`.
    pub fn instance_id(&self) -> Result<InstanceId> {
        let raw = self.instance.as_deref().ok_or_else(|| {
            Error::validation(
                format!("No instance id: pass --instance or set {INSTANCE_ENV}"),
                "instance",
                None,
                "required",
            )
        })?;
        Ok(InstanceId::parse(raw)?)
    }

    pub async fn open(&self) -> Result<Coordinator> {
        let root = self.root.clone();
        run_blocking(move || Coordinator::open(root)).await
    }
}

/// Run synchronous store work without stalling the async runtime.
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> concord_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("Blocking task failed: {e}"))?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(instance: Option<&str>) -> Context {
        Context {
            root: PathBuf::from("."),
            format: OutputFormat::Human,
            instance: instance.map(String::from),
        }
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Denied.exit_code(), 5);
        assert_eq!(Outcome::from_granted(false), Outcome::Denied);
    }

    #[test]
    fn test_missing_instance_is_validation_error() {
        let err = context(None).instance_id().map_err(|e| e.downcast::<Error>());
        assert!(matches!(err, Err(Ok(Error::ValidationError { .. }))));
    }

    #[test]
    fn test_instance_id_is_validated() {
        assert!(context(Some("agent-a")).instance_id().is_ok());
        assert!(context(Some("../escape")).instance_id().is_err());
    }

    #[tokio::test]
    async fn test_run_blocking_keeps_core_error_type() {
        let result: Result<()> = run_blocking(|| Err(Error::NotFound("x".into()))).await;
        let code = result
            .err()
            .and_then(|e| e.downcast_ref::<Error>().map(Error::exit_code));
        assert_eq!(code, Some(3));
    }
}
