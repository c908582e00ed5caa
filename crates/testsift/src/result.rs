//! Result and error types for testsift.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for testsift operations
pub type SiftResult<T> = Result<T, SiftError>;

/// Errors that can occur in testsift
///
/// Only the loading and persistence layers surface these. The optimizer
/// and the per-test coverage queries log them and degrade instead.
#[derive(Debug, Error)]
pub enum SiftError {
    /// Input ended before a complete value could be decoded
    #[error("Truncated input while decoding {context}")]
    Truncated {
        /// What was being decoded
        context: &'static str,
    },

    /// Input does not carry the expected format tag
    #[error("Unrecognised format tag {found:#x} (expected {expected:#x})")]
    ForeignFormat {
        /// Tag found in the input
        found: u32,
        /// Tag this reader understands
        expected: u32,
    },

    /// Generic decoding failure
    #[error("Failed to decode {context}: {message}")]
    Decode {
        /// What was being decoded
        context: &'static str,
        /// Error message
        message: String,
    },

    /// Persisted snapshot uses a schema this build cannot read
    #[error("Snapshot schema version {found} is not supported (expected {expected})")]
    IncompatibleSchema {
        /// Schema version found on disk
        found: u32,
        /// Schema version this build writes
        expected: u32,
    },

    /// Persisted snapshot was written by a different tool version
    #[error("Snapshot was written by version {found}, running {running}")]
    ToolVersionMismatch {
        /// Tool version recorded in the snapshot
        found: String,
        /// Tool version currently running
        running: String,
    },

    /// Snapshot body digest does not match its contents
    #[error("Snapshot at {path} is corrupt: digest mismatch")]
    CorruptSnapshot {
        /// Snapshot location
        path: PathBuf,
    },

    /// Snapshot body could not be encoded
    #[error("Failed to encode snapshot: {message}")]
    SnapshotEncode {
        /// Error message
        message: String,
    },

    /// Neither the primary nor the alternate recording could be read
    #[error("No readable recording at {path}")]
    UnreadableRecording {
        /// Primary recording path
        path: PathBuf,
        /// Last error encountered
        #[source]
        source: Box<SiftError>,
    },

    /// Source registry could not be loaded
    #[error("Failed to load source registry from {path}: {message}")]
    RegistryLoad {
        /// Registry location
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl SiftError {
    /// Build a decode error
    pub(crate) fn decode(context: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            context,
            message: message.into(),
        }
    }

    /// True when the error means the input simply ended early
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = SiftError::Truncated {
            context: "recording header",
        };
        assert_eq!(
            err.to_string(),
            "Truncated input while decoding recording header"
        );
        assert!(err.is_truncation());
    }

    #[test]
    fn test_foreign_format_hex() {
        let err = SiftError::ForeignFormat {
            found: 0xdead,
            expected: 0x5453,
        };
        assert!(err.to_string().contains("0xdead"));
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> SiftResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(SiftError::Io(_))));
    }
}
