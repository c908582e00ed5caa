//! Snapshot persistence.
//!
//! ```text
//! magic "TSNP" | schema u32 | tool_version str | sha256 [32] | bincode body
//! ```
//!
//! The digest covers the body only. A snapshot that fails any check is
//! reported as absent by [`Snapshot::load_from`].

use super::{Snapshot, TOOL_VERSION};
use crate::recording::wire::{WireReader, WireWriter};
use crate::result::{SiftError, SiftResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Leading bytes of every snapshot file
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"TSNP";

/// Layout version of the snapshot body
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

const DIGEST_LEN: usize = 32;

fn digest_of(body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.finalize().into()
}

impl Snapshot {
    /// Snapshot location for a registry initialised from `init`
    #[must_use]
    pub fn file_for_init_string(init: impl AsRef<Path>) -> PathBuf {
        crate::config::snapshot_file_for(init.as_ref())
    }

    /// Serialize into the on-disk layout
    pub fn encode(&self) -> SiftResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| SiftError::SnapshotEncode {
            message: e.to_string(),
        })?;
        let mut out = WireWriter::new();
        out.raw(&SNAPSHOT_MAGIC);
        out.u32(SNAPSHOT_SCHEMA_VERSION);
        out.str(&self.tool_version);
        out.raw(&digest_of(&body));
        out.raw(&body);
        Ok(out.into_bytes())
    }

    /// Parse the on-disk layout; `path` is only used in errors
    pub fn decode(bytes: &[u8], path: &Path) -> SiftResult<Self> {
        let mut input = WireReader::new(bytes, "snapshot");
        let magic = input.raw(SNAPSHOT_MAGIC.len())?;
        if magic != SNAPSHOT_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(SiftError::ForeignFormat {
                found: u32::from_be_bytes(found),
                expected: u32::from_be_bytes(SNAPSHOT_MAGIC),
            });
        }
        let schema = input.u32()?;
        if schema != SNAPSHOT_SCHEMA_VERSION {
            return Err(SiftError::IncompatibleSchema {
                found: schema,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        let tool_version = input.str()?;
        if tool_version != TOOL_VERSION {
            return Err(SiftError::ToolVersionMismatch {
                found: tool_version,
                running: TOOL_VERSION.to_string(),
            });
        }
        let digest = input.raw(DIGEST_LEN)?;
        let body = input.rest();
        if digest != digest_of(body) {
            return Err(SiftError::CorruptSnapshot {
                path: path.to_path_buf(),
            });
        }
        let mut snapshot: Self = bincode::deserialize(body)
            .map_err(|e| SiftError::decode("snapshot body", e.to_string()))?;
        snapshot.location = Some(path.to_path_buf());
        Ok(snapshot)
    }

    /// Write to `path` and remember it as the location
    pub fn store_to(&mut self, path: &Path) -> SiftResult<()> {
        self.location = Some(path.to_path_buf());
        self.store()
    }

    /// Write to the current location, creating parent directories
    pub fn store(&self) -> SiftResult<()> {
        let Some(path) = &self.location else {
            return Err(SiftError::InvalidConfig {
                message: "snapshot has no location".to_string(),
            });
        };
        let bytes = self.encode()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        debug!(path = %path.display(), tests = self.test_count(), "stored snapshot");
        Ok(())
    }

    /// Read a snapshot, reporting why it could not be used
    pub fn try_load_from(path: &Path) -> SiftResult<Self> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes, path)
    }

    /// Read a snapshot; absent, corrupt or incompatible files yield `None`
    #[must_use]
    pub fn load_from(path: &Path) -> Option<Self> {
        match Self::try_load_from(path) {
            Ok(snapshot) => Some(snapshot),
            Err(SiftError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unusable snapshot");
                None
            }
        }
    }

    /// Remove the stored file, if any
    pub fn delete(&self) -> SiftResult<()> {
        let Some(path) = &self.location else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted snapshot");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
