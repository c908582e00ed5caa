//! Coverage recordings on disk.
//!
//! Recordings are written by the instrumented test run and read back here:
//!
//! - [`GlobalRecording`]: summed hit counters for a run, written to a primary
//!   file and an alternate copy so an interrupted write never loses both
//! - [`PerTestTranscript`]: the coverage slice and outcome of one test
//! - [`RecordingFilter`]: finds the recordings of a database by file name

mod filter;
mod header;
mod naming;
mod trace;
mod transcript;
pub(crate) mod wire;

pub use filter::{parse_recording_name, FileRef, RecordingFilter, RecordingKind};
pub use header::{RecordingHeader, GLOBAL_FORMAT, SLICE_FORMAT};
pub use naming::{
    alternate_name, base36, parse_base36, recording_name, slice_recording_name, typed_test_id,
    ALT_SUFFIX, SLICE_SUFFIX,
};
pub use trace::{TraceFilter, DEFAULT_IGNORED_PREFIXES};
pub use transcript::{GlobalRecording, PerTestTranscript, MAX_SLOT_COUNT};

use crate::result::{SiftError, SiftResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;
use wire::WireReader;

/// A decoded recording of either kind
#[derive(Debug, Clone)]
pub enum Recording {
    /// Whole-run counters
    Global(GlobalRecording),
    /// One test execution
    Slice(PerTestTranscript),
}

impl Recording {
    /// Header of the recording
    #[must_use]
    pub fn header(&self) -> &RecordingHeader {
        match self {
            Self::Global(rec) => rec.header(),
            Self::Slice(rec) => rec.header(),
        }
    }
}

/// Path of the alternate copy of a recording
#[must_use]
pub fn alternate_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ALT_SUFFIX);
    PathBuf::from(name)
}

/// A copy of a global recording whose bytes were read and whose header parsed
struct Candidate {
    path: PathBuf,
    bytes: Vec<u8>,
    written: i64,
}

fn open_candidate(path: &Path) -> SiftResult<Candidate> {
    let bytes = transcript::read_deflated(path, "global recording")?;
    let header = RecordingHeader::read(&mut WireReader::new(&bytes, "global recording"), GLOBAL_FORMAT)?;
    debug!(path = %path.display(), db_version = header.db_version, "read recording header");
    Ok(Candidate {
        path: path.to_path_buf(),
        bytes,
        written: header.write_timestamp,
    })
}

/// Read a global recording, consulting its alternate copy
///
/// When both copies have a readable header the more recently written one
/// is decoded first; if that fails the other is tried. Fails only when
/// neither copy can be decoded.
pub fn read_global_with_alternate(path: &Path) -> SiftResult<GlobalRecording> {
    let alt_path = alternate_path(path);
    let mut last_error = None;

    let mut note = |path: &Path, e: SiftError| {
        debug!(path = %path.display(), error = %e, "error reading recording, skipped");
        last_error = Some(e);
    };

    let primary = open_candidate(path).map_err(|e| note(path, e)).ok();
    let alternate = if alt_path.exists() {
        open_candidate(&alt_path).map_err(|e| note(&alt_path, e)).ok()
    } else {
        None
    };

    let ordered: Vec<Candidate> = match (primary, alternate) {
        (Some(p), Some(a)) if a.written > p.written => vec![a, p],
        (Some(p), Some(a)) => vec![p, a],
        (Some(p), None) => vec![p],
        (None, Some(a)) => vec![a],
        (None, None) => Vec::new(),
    };

    for candidate in ordered {
        match GlobalRecording::decode(&candidate.bytes) {
            Ok(rec) => {
                debug!(path = %candidate.path.display(), "read recording data");
                return Ok(rec);
            }
            Err(e) => note(&candidate.path, e),
        }
    }

    Err(SiftError::UnreadableRecording {
        path: path.to_path_buf(),
        source: Box::new(last_error.unwrap_or_else(|| SiftError::Truncated {
            context: "global recording",
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pair(dir: &Path, primary_ts: i64, alt_ts: i64) -> PathBuf {
        let path = dir.join("db1_1");
        GlobalRecording::with_header(RecordingHeader::new(1, primary_ts, GLOBAL_FORMAT), vec![1, 0])
            .write_to(&path)
            .unwrap();
        GlobalRecording::with_header(RecordingHeader::new(1, alt_ts, GLOBAL_FORMAT), vec![0, 2])
            .write_to(&alternate_path(&path))
            .unwrap();
        path
    }

    #[test]
    fn test_alternate_path() {
        assert_eq!(alternate_path(Path::new("/a/db1_2")), PathBuf::from("/a/db1_2.1"));
    }

    #[test]
    fn test_prefers_newer_alternate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pair(tmp.path(), 10, 20);
        let rec = read_global_with_alternate(&path).unwrap();
        assert_eq!(rec.hit_counts(), &[0, 2]);
    }

    #[test]
    fn test_prefers_newer_primary() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pair(tmp.path(), 30, 20);
        let rec = read_global_with_alternate(&path).unwrap();
        assert_eq!(rec.hit_counts(), &[1, 0]);
    }

    #[test]
    fn test_falls_back_when_primary_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pair(tmp.path(), 30, 20);
        std::fs::write(&path, b"garbage").unwrap();
        let rec = read_global_with_alternate(&path).unwrap();
        assert_eq!(rec.header().write_timestamp, 20);
    }

    #[test]
    fn test_falls_back_when_newer_body_is_truncated() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pair(tmp.path(), 10, 20);
        // newer alternate keeps a valid header but loses its body
        let full = GlobalRecording::with_header(RecordingHeader::new(1, 20, GLOBAL_FORMAT), vec![0, 2]).encode();
        transcript::write_deflated(&alternate_path(&path), &full[..full.len() - 3]).unwrap();
        let rec = read_global_with_alternate(&path).unwrap();
        assert_eq!(rec.hit_counts(), &[1, 0]);
    }

    #[test]
    fn test_neither_readable_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("db1_1");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            read_global_with_alternate(&path),
            Err(SiftError::UnreadableRecording { .. })
        ));
        assert!(read_global_with_alternate(&tmp.path().join("absent")).is_err());
    }

    #[test]
    fn test_file_ref_read_dispatches() {
        let tmp = tempfile::tempdir().unwrap();
        let name = recording_name(1, "db", 5);
        GlobalRecording::new(3, vec![4]).write_to(&tmp.path().join(&name)).unwrap();
        let file = parse_recording_name(tmp.path(), &name, "db").unwrap();
        let rec = file.read().unwrap();
        assert!(matches!(rec, Recording::Global(_)));
        assert_eq!(rec.header().db_version, 3);
    }
}
