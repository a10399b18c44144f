//! Advisory document locks.
//!
//! Cross-process mutual exclusion for the coordination store, built on
//! `fs2` exclusive locks with bounded retry and exponential backoff.
//!
//! # Design Principles
//!
//! - **Bounded wait**: acquisition gives up after `max_wait_ms`
//! - **Stale break**: a lock file whose stamp is older than `stale_after_secs`
//!   when the wait runs out is unlinked once and acquisition retried
//! - **Drop-safe**: locks are released when the guard is dropped
//! - **Lock files persist**: deleting them in the normal flow would let a
//!   waiter lock an orphaned inode

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime},
};

use fs2::FileExt;

use crate::{Error, Result};

/// Default upper bound on waiting for a document lock
const DEFAULT_MAX_WAIT_MS: u64 = 10_000;

/// Base delay in milliseconds for exponential backoff
const BASE_DELAY_MS: u64 = 2;

/// Maximum delay in milliseconds between attempts
const MAX_DELAY_MS: u64 = 250;

/// Lock files stamped longer ago than this are considered abandoned
const DEFAULT_STALE_AFTER_SECS: u64 = 30;

/// Configuration for lock acquisition behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Total time to keep retrying before giving up
    pub max_wait_ms: u64,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Age after which a contended lock file may be broken
    pub stale_after_secs: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

impl LockOptions {
    /// Create lock options with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total wait budget
    #[must_use]
    pub const fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    /// Set base delay for exponential backoff
    #[must_use]
    pub const fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay for exponential backoff
    #[must_use]
    pub const fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the abandoned-lock threshold
    #[must_use]
    pub const fn with_stale_after_secs(mut self, stale_after_secs: u64) -> Self {
        self.stale_after_secs = stale_after_secs;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.checked_pow(attempt.min(20)).map_or(u64::MAX, |v| v);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// An exclusive document lock that releases when dropped.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    lock_path: PathBuf,
}

impl DocumentLock {
    /// Get the path to the lock file
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(lock = %self.lock_path.display(), error = %e, "Explicit unlock failed; closing releases it");
        }
        tracing::trace!(lock = %self.lock_path.display(), "Released document lock");
    }
}

/// Acquire an exclusive lock on `lock_path`, blocking up to the wait budget.
///
/// The lock file and its parent directories are created if missing. On
/// success the holder's pid and acquisition time are stamped into the file so
/// that a stuck holder can be recognised by age.
///
/// # Errors
///
/// - `LockTimeout` if the lock stays contended past `max_wait_ms`
/// - `IoError` if the lock file cannot be opened or stamped
pub fn acquire(lock_path: impl AsRef<Path>, options: &LockOptions) -> Result<DocumentLock> {
    let lock_path = lock_path.as_ref();

    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!(
                "Failed to create lock directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let started = Instant::now();
    let budget = Duration::from_millis(options.max_wait_ms);
    let mut attempt: u32 = 0;
    let mut broke_stale = false;

    loop {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                stamp(&file, lock_path)?;
                tracing::trace!(lock = %lock_path.display(), attempts = attempt + 1, "Acquired document lock");
                return Ok(DocumentLock {
                    file,
                    lock_path: lock_path.to_path_buf(),
                });
            }
            Err(e) if is_contended(&e) => {
                if started.elapsed() >= budget {
                    if !broke_stale && is_abandoned(lock_path, options.stale_after_secs) {
                        tracing::warn!(
                            lock = %lock_path.display(),
                            stale_after_secs = options.stale_after_secs,
                            "Breaking abandoned store lock"
                        );
                        std::fs::remove_file(lock_path).map_err(|e| {
                            Error::IoError(format!(
                                "Failed to break stale lock '{}': {e}",
                                lock_path.display()
                            ))
                        })?;
                        broke_stale = true;
                        continue;
                    }

                    return Err(Error::LockTimeout {
                        lock_path: lock_path.display().to_string(),
                        waited_ms: u64::try_from(started.elapsed().as_millis())
                            .map_or(u64::MAX, |v| v),
                    });
                }

                let delay = options.delay_for(attempt);
                tracing::trace!(
                    lock = %lock_path.display(),
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).map_or(u64::MAX, |v| v),
                    "Document lock contended, retrying"
                );
                std::thread::sleep(delay);
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to lock '{}': {e}",
                    lock_path.display()
                )));
            }
        }
    }
}

/// Run `f` while holding the lock at `lock_path`.
pub fn with_lock<T>(
    lock_path: impl AsRef<Path>,
    options: &LockOptions,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = acquire(lock_path, options)?;
    f()
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to open lock file '{}': {e}",
                lock_path.display()
            ))
        })
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind()
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn stamp(file: &File, lock_path: &Path) -> Result<()> {
    let stamp = format!(
        "pid={} at={}\n",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    );
    file.set_len(0)
        .and_then(|()| {
            let mut writer = file;
            writer.write_all(stamp.as_bytes())
        })
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to stamp lock file '{}': {e}",
                lock_path.display()
            ))
        })
}

fn is_abandoned(lock_path: &Path, stale_after_secs: u64) -> bool {
    std::fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= Duration::from_secs(stale_after_secs))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_acquire_and_release_lock() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let lock_path = temp_dir.path().join("doc.json.lock");

        {
            let lock = acquire(&lock_path, &LockOptions::default())?;
            assert!(lock.lock_path().exists());
        }

        let again = acquire(&lock_path, &LockOptions::default())?;
        assert!(again.lock_path().exists());
        Ok(())
    }

    #[test]
    fn test_lock_contention_times_out() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let lock_path = temp_dir.path().join("contended.lock");

        let held = acquire(&lock_path, &LockOptions::default())?;

        let options = LockOptions::new()
            .with_max_wait_ms(30)
            .with_base_delay_ms(5)
            .with_stale_after_secs(3600);
        let result = acquire(&lock_path, &options);
        assert!(matches!(result, Err(Error::LockTimeout { .. })));

        drop(held);
        let after = acquire(&lock_path, &options);
        assert!(after.is_ok());
        Ok(())
    }

    #[test]
    fn test_abandoned_lock_is_broken_once() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let lock_path = temp_dir.path().join("abandoned.lock");

        let _stuck = acquire(&lock_path, &LockOptions::default())?;

        // stale_after_secs = 0: any contended lock counts as abandoned
        let options = LockOptions::new()
            .with_max_wait_ms(0)
            .with_stale_after_secs(0);
        let broken = acquire(&lock_path, &options)?;
        assert!(broken.lock_path().exists());
        Ok(())
    }

    #[test]
    fn test_parent_directories_are_created() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let lock_path = temp_dir.path().join("nested/dir/doc.lock");

        let lock = acquire(&lock_path, &LockOptions::default())?;
        assert!(lock.lock_path().exists());
        Ok(())
    }

    #[test]
    fn test_with_lock_serializes_threads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let lock_path = Arc::new(temp_dir.path().join("counter.lock"));
        let counter_path = Arc::new(temp_dir.path().join("counter"));
        std::fs::write(&*counter_path, "0")?;
        let failures = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock_path = Arc::clone(&lock_path);
                let counter_path = Arc::clone(&counter_path);
                let failures = Arc::clone(&failures);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let result = with_lock(&*lock_path, &LockOptions::default(), || {
                            let current: u64 = std::fs::read_to_string(&*counter_path)?
                                .trim()
                                .parse()
                                .map_err(|e| Error::ParseError(format!("{e}")))?;
                            std::fs::write(&*counter_path, (current + 1).to_string())?;
                            Ok(())
                        });
                        if result.is_err() {
                            failures.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().map_err(|_| Error::Unknown("thread panicked".into()))?;
        }

        assert_eq!(failures.load(Ordering::SeqCst), 0);
        let total = std::fs::read_to_string(&*counter_path)?;
        assert_eq!(total.trim(), "80");
        Ok(())
    }

    #[test]
    fn test_lock_options_builder() {
        let options = LockOptions::new()
            .with_max_wait_ms(500)
            .with_base_delay_ms(1)
            .with_max_delay_ms(50)
            .with_stale_after_secs(5);

        assert_eq!(options.max_wait_ms, 500);
        assert_eq!(options.base_delay_ms, 1);
        assert_eq!(options.max_delay_ms, 50);
        assert_eq!(options.stale_after_secs, 5);
        assert_eq!(options.delay_for(10), Duration::from_millis(50));
    }
}
