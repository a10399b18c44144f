//! Lock target paths.
//!
//! Every path handed to the lock manager is normalized to one canonical form:
//! relative to the project root, `/`-separated, with `.` and `..` resolved
//! lexically. Two spellings of the same file therefore contend for the same
//! lock. The canonical form maps to a filesystem-safe key used as the lock
//! record's file name: reversible percent escaping, with a hash suffix once
//! the escaped form would be too long for a file name.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Longest key used verbatim. With `.json.lock` and temp-file suffixes the
/// file name stays well under the common 255-byte `NAME_MAX`.
pub const MAX_KEY_LEN: usize = 160;
const HASH_SUFFIX_BYTES: usize = 16;

/// A normalized, root-relative lock target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockPath(String);

impl LockPath {
    /// Resolve `raw` (absolute, or relative to `project_root`) to its
    /// canonical form.
    ///
    /// # Errors
    ///
    /// `ValidationError` if the path is empty, not UTF-8, names the root
    /// itself, or escapes the project root.
    pub fn resolve(project_root: &Path, raw: impl AsRef<Path>) -> Result<Self> {
        let raw = raw.as_ref();
        let display = raw.display().to_string();

        if raw.as_os_str().is_empty() {
            return Err(invalid("Lock path cannot be empty", &display, "non-empty"));
        }

        let relative = if raw.is_absolute() {
            strip_root(project_root, raw).ok_or_else(|| {
                invalid(
                    format!(
                        "Path '{display}' is outside the project root '{}'",
                        project_root.display()
                    ),
                    &display,
                    "inside project root",
                )
            })?
        } else {
            raw.to_path_buf()
        };

        let mut parts: Vec<&str> = Vec::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(invalid(
                            format!("Path '{display}' escapes the project root"),
                            &display,
                            "inside project root",
                        ));
                    }
                }
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        invalid(
                            format!("Path '{display}' is not valid UTF-8"),
                            &display,
                            "utf-8",
                        )
                    })?;
                    parts.push(part);
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid(
                        format!("Path '{display}' is outside the project root"),
                        &display,
                        "inside project root",
                    ));
                }
            }
        }

        if parts.is_empty() {
            return Err(invalid(
                format!("Path '{display}' names the project root, not a file"),
                &display,
                "names a file",
            ));
        }

        Ok(Self(parts.join("/")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this path under `project_root`.
    #[must_use]
    pub fn absolute(&self, project_root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(project_root.to_path_buf(), |acc, part| acc.join(part))
    }

    /// Filesystem-safe key: `[A-Za-z0-9._-]` pass through, every other byte
    /// becomes `%XX`.
    ///
    /// Escaped keys longer than [`MAX_KEY_LEN`] are cut at an escape boundary
    /// and suffixed with `~` and 128 bits of the path's SHA-256. `~` never
    /// appears in an escaped key, so the two forms cannot collide. Only short
    /// keys reverse through [`LockPath::from_key`]; the lock record itself
    /// always carries the full path.
    #[must_use]
    pub fn key(&self) -> String {
        let escaped = escape(&self.0);
        if escaped.len() <= MAX_KEY_LEN {
            return escaped;
        }

        let digest = Sha256::digest(self.0.as_bytes());
        let suffix = digest[..HASH_SUFFIX_BYTES]
            .iter()
            .fold(String::with_capacity(HASH_SUFFIX_BYTES * 2), |mut acc, b| {
                acc.push_str(&format!("{b:02x}"));
                acc
            });

        let mut cut = MAX_KEY_LEN - 1 - suffix.len();
        // do not split a %XX escape
        if let Some(pos) = escaped[cut.saturating_sub(2)..cut].find('%') {
            cut = cut - 2 + pos;
        }
        format!("{}~{suffix}", &escaped[..cut])
    }

    /// Invert [`LockPath::key`] for keys that were not shortened.
    ///
    /// # Errors
    ///
    /// `ParseError` for a malformed escape, invalid UTF-8, or a hashed key.
    pub fn from_key(key: &str) -> Result<Self> {
        if key.contains('~') {
            return Err(Error::ParseError(format!(
                "Lock key '{key}' is shortened; read the path from its lock record"
            )));
        }

        let bytes = key.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = key
                    .get(i + 1..i + 3)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::ParseError(format!("Malformed lock key '{key}'")))?;
                decoded.push(hex);
                i += 3;
            } else {
                decoded.push(bytes[i]);
                i += 1;
            }
        }

        String::from_utf8(decoded)
            .map(Self)
            .map_err(|_| Error::ParseError(format!("Lock key '{key}' is not valid UTF-8")))
    }
}

fn escape(raw: &str) -> String {
    raw.bytes().fold(String::with_capacity(raw.len()), |mut key, b| {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            key.push(char::from(b));
        } else {
            key.push_str(&format!("%{b:02X}"));
        }
        key
    })
}

impl fmt::Display for LockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_root(project_root: &Path, raw: &Path) -> Option<PathBuf> {
    if let Ok(rest) = raw.strip_prefix(project_root) {
        return Some(rest.to_path_buf());
    }
    // The root may have been handed over un-canonicalized (symlinked temp dirs)
    let canonical_root = project_root.canonicalize().ok()?;
    if let Ok(rest) = raw.strip_prefix(&canonical_root) {
        return Some(rest.to_path_buf());
    }
    let canonical_raw = raw.canonicalize().ok()?;
    canonical_raw
        .strip_prefix(&canonical_root)
        .ok()
        .map(Path::to_path_buf)
}

fn invalid(message: impl Into<String>, value: &str, constraint: &str) -> Error {
    Error::validation(message, "path", Some(value.to_string()), constraint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn test_relative_spellings_normalize_to_one_form() -> Result<()> {
        let a = LockPath::resolve(&root(), "src/lib.rs")?;
        let b = LockPath::resolve(&root(), "./src/../src/./lib.rs")?;
        let c = LockPath::resolve(&root(), "/work/project/src/lib.rs")?;

        assert_eq!(a.as_str(), "src/lib.rs");
        assert_eq!(a, b);
        assert_eq!(a, c);
        Ok(())
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        assert!(LockPath::resolve(&root(), "../other/file.rs").is_err());
        assert!(LockPath::resolve(&root(), "src/../../x").is_err());
        assert!(LockPath::resolve(&root(), "/etc/passwd").is_err());
        assert!(LockPath::resolve(&root(), "").is_err());
        assert!(LockPath::resolve(&root(), ".").is_err());
    }

    #[test]
    fn test_key_escapes_separators_and_round_trips() -> Result<()> {
        let path = LockPath::resolve(&root(), "src/my file%.rs")?;
        let key = path.key();

        assert_eq!(key, "src%2Fmy%20file%25.rs");
        assert_eq!(LockPath::from_key(&key)?, path);
        Ok(())
    }

    #[test]
    fn test_distinct_paths_have_distinct_keys() -> Result<()> {
        let a = LockPath::resolve(&root(), "a/b")?;
        let b = LockPath::resolve(&root(), "a%2Fb")?;
        assert_ne!(a.key(), b.key());
        Ok(())
    }

    #[test]
    fn test_long_paths_get_bounded_distinct_keys() -> Result<()> {
        let deep: String = (0..16).map(|i| format!("segment_dir_{i:02}/")).collect();
        let a = LockPath::resolve(&root(), format!("{deep}file.rs"))?;
        let b = LockPath::resolve(&root(), format!("{deep}file.rt"))?;
        assert!(a.as_str().len() > 200);

        let (ka, kb) = (a.key(), b.key());
        assert!(ka.len() <= MAX_KEY_LEN, "{} chars", ka.len());
        assert!(ka.contains('~'));
        assert_ne!(ka, kb);
        assert_eq!(ka, a.key());
        assert!(ka.chars().all(|c| c.is_ascii_alphanumeric() || "._-%~".contains(c)));
        assert!(matches!(LockPath::from_key(&ka), Err(Error::ParseError(_))));
        Ok(())
    }

    #[test]
    fn test_shortened_key_never_splits_an_escape() -> Result<()> {
        for pad in 0..4 {
            let raw = format!("{}{}", "a".repeat(pad), "/b".repeat(120));
            let key = LockPath::resolve(&root(), &raw)?.key();
            let prefix = key.split_once('~').map_or(key.as_str(), |(p, _)| p);
            let stray = prefix.rfind('%').is_some_and(|i| i + 3 > prefix.len());
            assert!(!stray, "split escape in {key}");
        }
        Ok(())
    }

    #[test]
    fn test_malformed_key_is_parse_error() {
        assert!(matches!(
            LockPath::from_key("abc%2"),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            LockPath::from_key("abc%ZZ"),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_absolute_joins_under_root() -> Result<()> {
        let path = LockPath::resolve(&root(), "src/lib.rs")?;
        assert_eq!(path.absolute(&root()), root().join("src").join("lib.rs"));
        Ok(())
    }

    #[test]
    fn test_resolve_through_canonical_root() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let canonical = dir.path().canonicalize()?;
        std::fs::write(canonical.join("f.txt"), "x")?;

        let path = LockPath::resolve(dir.path(), canonical.join("f.txt"))?;
        assert_eq!(path.as_str(), "f.txt");
        Ok(())
    }
}
