//! Content fingerprints for optimistic conflict detection.

use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const ABSENT: &str = "absent";
const CHUNK_SIZE: usize = 8192;

/// Digest of a file's content at a point in time, or the `absent` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a file that does not exist.
    #[must_use]
    pub fn absent() -> Self {
        Self(ABSENT.to_string())
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0 == ABSENT
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash the file at `path`, streaming it in fixed-size chunks.
    ///
    /// A missing file yields [`Fingerprint::absent`], so creating a file that
    /// did not exist at lock time counts as a modification.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::absent()),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to fingerprint '{}': {e}",
                    path.display()
                )))
            }
        };

        let mut hasher = Sha256::new();
        let mut buf = [0_u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).map_err(|e| {
                Error::IoError(format!("Failed to fingerprint '{}': {e}", path.display()))
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let hex = hasher
            .finalize()
            .iter()
            .fold(String::with_capacity(64), |mut acc, b| {
                acc.push_str(&format!("{b:02x}"));
                acc
            });
        Ok(Self(format!("sha256:{hex}")))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
