//! Error types for Concord.
//!
//! Only storage-level and input failures are errors. Lock contention, expired
//! leases and content conflicts are ordinary outcomes (see [`crate::locks`]),
//! and a stale instance is reclaimed rather than reported.
//!
//! Exit code scheme:
//! - 1: Validation or configuration error
//! - 2: IO, storage or unknown error
//! - 3: Not found
//! - 4: Timed out waiting for a store lock

use thiserror::Error;

/// Core error type for coordination operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Configuration is malformed or out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted document or input could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Input failed validation
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
        value: Option<String>,
        constraints: Vec<String>,
    },

    /// Filesystem error outside the atomic write path
    #[error("IO error: {0}")]
    IoError(String),

    /// The atomic-write primitive failed; the previous document is intact
    #[error("Storage failure on '{document}': {reason}")]
    StorageFailure { document: String, reason: String },

    /// The advisory lock on a document could not be taken in time
    #[error("Timed out after {waited_ms}ms waiting for store lock '{lock_path}'")]
    LockTimeout { lock_path: String, waited_ms: u64 },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Fallback
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Create a validation error for a single field.
    pub fn validation(
        message: impl Into<String>,
        field: &str,
        value: Option<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.to_string()),
            value,
            constraints: vec![constraint.into()],
        }
    }

    /// Create a storage failure for a document.
    pub fn storage(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageFailure {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Returns the process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::ParseError(_) | Self::ValidationError { .. } => 1,
            Self::IoError(_) | Self::StorageFailure { .. } | Self::Unknown(_) => 2,
            Self::NotFound(_) => 3,
            Self::LockTimeout { .. } => 4,
        }
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::StorageFailure { .. } => "STORAGE_FAILURE",
            Self::LockTimeout { .. } => "STORE_LOCK_TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError(format!("Failed to parse config: {err}"))
    }
}

/// Result type alias for coordination operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_storage_failure() {
        let err = Error::storage("registry.json", "disk full");
        assert_eq!(
            err.to_string(),
            "Storage failure on 'registry.json': disk full"
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::InvalidConfig("x".into()).exit_code(), 1);
        assert_eq!(
            Error::validation("bad", "path", None, "non-empty").exit_code(),
            1
        );
        assert_eq!(Error::storage("d", "r").exit_code(), 2);
        assert_eq!(Error::IoError("x".into()).exit_code(), 2);
        assert_eq!(Error::NotFound("x".into()).exit_code(), 3);
        assert_eq!(
            Error::LockTimeout {
                lock_path: "a.lock".into(),
                waited_ms: 10
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_codes_are_upper_snake() {
        let errors = [
            Error::InvalidConfig(String::new()),
            Error::ParseError(String::new()),
            Error::storage("d", "r"),
            Error::NotFound(String::new()),
        ];
        for err in errors {
            assert!(err
                .code()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
