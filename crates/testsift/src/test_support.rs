//! Fixtures shared by unit tests.

use crate::coverage::SlotRange;
use crate::identity::{ExitStatus, TestIdentity};
use crate::recording::PerTestTranscript;
use crate::registry::{ManifestRegistry, SourceFile, SourceFingerprint};
use crate::run::CoverageRun;
use std::path::PathBuf;

/// Slots owned by each fixture file
pub(crate) const FILE_SLOTS: u32 = 20;

/// Test `method` declared on `class`, with a path derived from the class name
pub(crate) fn test_id(class: &str, method: &str) -> TestIdentity {
    TestIdentity::declared(class, method, format!("{}.java", class.replace('.', "/")))
}

/// File `index` of a fixture registry
pub(crate) fn source_file(index: u32, path: &str, checksum: u64) -> SourceFile {
    let start = index * FILE_SLOTS;
    SourceFile::new(
        path,
        SourceFingerprint::new(checksum, 100),
        SlotRange::new(start, FILE_SLOTS),
        (0..FILE_SLOTS).step_by(5).map(|offset| start + offset).collect(),
    )
}

/// Registry of consecutive files, each `(path, checksum)` with size 100
pub(crate) fn registry(version: u64, files: &[(&str, u64)]) -> ManifestRegistry {
    let files = files
        .iter()
        .enumerate()
        .map(|(i, (path, checksum))| source_file(i as u32, path, *checksum))
        .collect();
    ManifestRegistry::new(version, files)
}

/// Builds an eager [`CoverageRun`] one test at a time
#[derive(Debug)]
pub(crate) struct RunBuilder {
    run: CoverageRun,
    next: usize,
}

impl RunBuilder {
    pub(crate) fn new() -> Self {
        Self {
            run: CoverageRun::eager(),
            next: 0,
        }
    }

    /// Add a test execution hitting the given `(file index, offset)` slots
    pub(crate) fn test(
        mut self,
        test: TestIdentity,
        start_ms: i64,
        end_ms: i64,
        status: ExitStatus,
        hits: &[(u32, u32)],
    ) -> Self {
        let coverage = hits
            .iter()
            .map(|(file, offset)| file * FILE_SLOTS + offset)
            .collect();
        let transcript = PerTestTranscript::new(1, test, start_ms, end_ms, status, coverage);
        self.next += 1;
        self.run
            .add_slice(&PathBuf::from(format!("slice{}.s", self.next)), transcript);
        self
    }

    pub(crate) fn build(self) -> CoverageRun {
        self.run
    }
}
