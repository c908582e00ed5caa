//! Recording header shared by global and per-test recordings.

use super::wire::{WireReader, WireWriter};
use crate::result::{SiftError, SiftResult};
use std::time::{SystemTime, UNIX_EPOCH};

/// Format tag of a global (whole-run) recording
pub const GLOBAL_FORMAT: u32 = 0x5453_4701;

/// Format tag of a per-test slice recording
pub const SLICE_FORMAT: u32 = 0x5453_5301;

/// Header written at the start of every recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingHeader {
    /// Registry version the recording was made against
    pub db_version: u64,
    /// Write time (ms since epoch)
    pub write_timestamp: i64,
    /// Format tag
    pub format: u32,
}

impl RecordingHeader {
    /// Create a header
    #[must_use]
    pub const fn new(db_version: u64, write_timestamp: i64, format: u32) -> Self {
        Self {
            db_version,
            write_timestamp,
            format,
        }
    }

    /// Create a header stamped with the current time
    #[must_use]
    pub fn now(db_version: u64, format: u32) -> Self {
        Self::new(db_version, now_millis(), format)
    }

    pub(crate) fn write(&self, out: &mut WireWriter) {
        out.u32(self.format);
        out.u64(self.db_version);
        out.i64(self.write_timestamp);
    }

    /// Read a header and check it carries the expected format tag
    pub(crate) fn read(input: &mut WireReader<'_>, expected: u32) -> SiftResult<Self> {
        let format = input.u32()?;
        if format != expected {
            return Err(SiftError::ForeignFormat {
                found: format,
                expected,
            });
        }
        let db_version = input.u64()?;
        let write_timestamp = input.i64()?;
        Ok(Self::new(db_version, write_timestamp, format))
    }
}

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
