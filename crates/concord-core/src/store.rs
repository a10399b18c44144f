//! Coordination store.
//!
//! Shared state lives in small JSON documents under one state directory.
//! Every mutation goes through [`CoordinationStore::transact`]: take the
//! document's advisory lock, read, transform, write to a temp file in the same
//! directory, fsync, atomically rename over the original, unlock.
//!
//! Readers never take the lock. Rename is atomic, so a reader sees either the
//! old or the new document, never a torn one.

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::{
    filelock::{self, LockOptions},
    Error, Result,
};

/// Registry of live instances.
pub const REGISTRY_DOC: &str = "registry.json";
/// Append-only decision ledger.
pub const DECISIONS_DOC: &str = "decisions.json";
/// One heartbeat record per instance.
pub const HEARTBEATS_DIR: &str = "heartbeats";
/// One record per locked path.
pub const LOCKS_DIR: &str = "locks";

const DOC_EXTENSION: &str = "json";
const LOCK_SUFFIX: &str = ".lock";

/// What a transaction does with the document it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit<T> {
    /// Leave the document as it was
    Unchanged,
    /// Atomically replace the document
    Replace(T),
    /// Delete the document
    Remove,
}

/// File-backed store of shared coordination documents.
#[derive(Debug, Clone)]
pub struct CoordinationStore {
    root: PathBuf,
    lock_options: LockOptions,
}

impl CoordinationStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, lock_options: LockOptions) -> Result<Self> {
        let root = root.into();
        for dir in [root.clone(), root.join(HEARTBEATS_DIR), root.join(LOCKS_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::IoError(format!(
                    "Failed to create state directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(Self { root, lock_options })
    }

    /// State directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a document.
    #[must_use]
    pub fn document_path(&self, document: &str) -> PathBuf {
        self.root.join(document)
    }

    fn lock_path(&self, document: &str) -> PathBuf {
        self.root.join(format!("{document}{LOCK_SUFFIX}"))
    }

    /// Read a document without locking.
    ///
    /// Returns `None` if the document does not exist.
    pub fn read<T: DeserializeOwned>(&self, document: &str) -> Result<Option<T>> {
        read_document(&self.document_path(document), document)
    }

    /// Serialized read-modify-write of one document.
    ///
    /// `f` sees the current content (or `None`) and decides what to commit.
    /// An `Err` from `f` aborts without touching the document.
    pub fn transact<T, R, F>(&self, document: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<(Commit<T>, R)>,
    {
        let path = self.document_path(document);
        let _guard = filelock::acquire(self.lock_path(document), &self.lock_options)?;

        let current = read_document(&path, document)?;
        let (commit, output) = f(current)?;

        match commit {
            Commit::Unchanged => {}
            Commit::Replace(value) => write_atomic(&path, document, &value)?,
            Commit::Remove => remove_document(&path, document)?,
        }

        Ok(output)
    }

    /// Read-modify-write of a document that has a natural empty value.
    pub fn update<T, R, F>(&self, document: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        self.transact(document, |current: Option<T>| {
            let mut value = current.unwrap_or_default();
            let output = f(&mut value);
            Ok((Commit::Replace(value), output))
        })
    }

    /// Read every document in `dir`, best-effort.
    ///
    /// Documents that vanish mid-scan are ignored; unreadable ones are logged
    /// and skipped. Only a failure to list the directory itself is an error.
    pub fn scan<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<(String, T)>> {
        let dir_path = self.root.join(dir);
        let entries = match std::fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to list '{}': {e}",
                    dir_path.display()
                )))
            }
        };

        let mut documents = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == DOC_EXTENSION))
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                let document = format!("{dir}/{name}");
                match read_document::<T>(&path, &document) {
                    Ok(Some(value)) => Some((document, value)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!(document = %document, error = %e, "Skipping unreadable document");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }
}

fn read_document<T: DeserializeOwned>(path: &Path, document: &str) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to read '{document}': {e}"
            )))
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::ParseError(format!("Corrupt document '{document}': {e}")))
}

fn write_atomic<T: Serialize>(path: &Path, document: &str, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::storage(document, "document has no parent directory"))?;
    std::fs::create_dir_all(parent).map_err(|e| Error::storage(document, e.to_string()))?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::storage(document, format!("serialize: {e}")))?;

    let mut temp =
        NamedTempFile::new_in(parent).map_err(|e| Error::storage(document, e.to_string()))?;
    temp.write_all(&json)
        .and_then(|()| temp.write_all(b"\n"))
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::storage(document, format!("write: {e}")))?;

    temp.persist(path)
        .map_err(|e| Error::storage(document, format!("rename: {}", e.error)))?;

    tracing::trace!(document, bytes = json.len(), "Document committed");
    Ok(())
}

fn remove_document(path: &Path, document: &str) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage(document, format!("remove: {e}"))),
    }
}
