//! Directory scanning for recording files.

use super::naming::{parse_base36, ALT_SUFFIX};
use super::{read_global_with_alternate, Recording};
use super::transcript::PerTestTranscript;
use crate::result::SiftResult;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// What a recording file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingKind {
    /// Whole-run hit counters
    Global,
    /// One test execution
    Slice {
        /// Type id in the high word, method id in the low word
        typed_test_id: u64,
        /// Run number of the method
        run_id: u64,
    },
}

/// A recording file recognised by its name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    path: PathBuf,
    kind: RecordingKind,
    hash: u64,
    timestamp: i64,
}

impl FileRef {
    /// Recording file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recording kind
    #[must_use]
    pub fn kind(&self) -> RecordingKind {
        self.kind
    }

    /// Whether this is a per-test slice
    #[must_use]
    pub fn is_test_recording(&self) -> bool {
        matches!(self.kind, RecordingKind::Slice { .. })
    }

    /// Combined type/method id, `None` for global recordings
    #[must_use]
    pub fn typed_test_id(&self) -> Option<u64> {
        match self.kind {
            RecordingKind::Slice { typed_test_id, .. } => Some(typed_test_id),
            RecordingKind::Global => None,
        }
    }

    /// Recorder hash
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Timestamp encoded in the name (ms since epoch)
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Read the file, using the alternate copy for global recordings
    pub fn read(&self) -> SiftResult<Recording> {
        match self.kind {
            RecordingKind::Slice { .. } => {
                PerTestTranscript::read_from(&self.path).map(Recording::Slice)
            }
            RecordingKind::Global => read_global_with_alternate(&self.path).map(Recording::Global),
        }
    }

    fn order_key(&self) -> (i64, u64, bool, Option<u64>) {
        (
            self.timestamp,
            self.hash,
            self.is_test_recording(),
            self.typed_test_id(),
        )
    }
}

impl Ord for FileRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.order_key().cmp(&other.order_key()))
            .then_with(|| {
                let run = |f: &Self| match f.kind {
                    RecordingKind::Slice { run_id, .. } => run_id,
                    RecordingKind::Global => 0,
                };
                run(self).cmp(&run(other))
            })
    }
}

impl PartialOrd for FileRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Recording file name patterns, compiled once per process
#[derive(Debug)]
struct NamePatterns {
    slice: Regex,
    global: Regex,
}

static NAME_PATTERNS: OnceLock<Option<NamePatterns>> = OnceLock::new();

impl NamePatterns {
    /// Shared instance; `None` only if the patterns failed to compile
    fn shared() -> Option<&'static Self> {
        NAME_PATTERNS
            .get_or_init(|| {
                const NUM: &str = "([0-9a-z]+)";
                let slice = Regex::new(&format!(r"^{NUM}_{NUM}_{NUM}_{NUM}\.s$")).ok()?;
                let global = Regex::new(&format!("^{NUM}_{NUM}$")).ok()?;
                Some(Self { slice, global })
            })
            .as_ref()
    }

    /// Recognise `file_name` in `dir` as a recording of `basename`
    fn parse(&self, dir: &Path, file_name: &str, basename: &str) -> Option<FileRef> {
        let suffix = file_name.strip_prefix(basename)?;
        if suffix.is_empty() || file_name.ends_with(ALT_SUFFIX) {
            return None;
        }
        let path = dir.join(file_name);
        if let Some(caps) = self.slice.captures(suffix) {
            return Some(FileRef {
                path,
                kind: RecordingKind::Slice {
                    typed_test_id: parse_base36(&caps[1])?,
                    run_id: parse_base36(&caps[2])?,
                },
                hash: parse_base36(&caps[3])?,
                timestamp: i64::try_from(parse_base36(&caps[4])?).ok()?,
            });
        }
        let caps = self.global.captures(suffix)?;
        Some(FileRef {
            path,
            kind: RecordingKind::Global,
            hash: parse_base36(&caps[1])?,
            timestamp: i64::try_from(parse_base36(&caps[2])?).ok()?,
        })
    }
}

/// Recognise a single recording file name
#[must_use]
pub fn parse_recording_name(dir: &Path, file_name: &str, basename: &str) -> Option<FileRef> {
    NamePatterns::shared()?.parse(dir, file_name, basename)
}

/// Collects the recording files of one coverage database
///
/// Files whose name timestamp falls outside `[from, to]` are ignored and,
/// when `delete_excluded` is set, removed from disk.
#[derive(Debug, Clone)]
pub struct RecordingFilter {
    dir: PathBuf,
    basename: String,
    from: i64,
    to: i64,
    delete_excluded: bool,
    load_per_test_data: bool,
    recording_files: BTreeMap<PathBuf, FileRef>,
    per_test_files: BTreeMap<PathBuf, FileRef>,
}

impl RecordingFilter {
    /// Filter accepting every recording of `basename` found in `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, basename: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            basename: basename.into(),
            from: i64::MIN,
            to: i64::MAX,
            delete_excluded: false,
            load_per_test_data: true,
            recording_files: BTreeMap::new(),
            per_test_files: BTreeMap::new(),
        }
    }

    /// Restrict to timestamps in `[from, to]`
    #[must_use]
    pub fn with_range(mut self, from: i64, to: i64) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Delete files outside the range while scanning
    #[must_use]
    pub fn with_delete_excluded(mut self, delete: bool) -> Self {
        self.delete_excluded = delete;
        self
    }

    /// Whether per-test slices are collected at all
    #[must_use]
    pub fn with_per_test_data(mut self, load: bool) -> Self {
        self.load_per_test_data = load;
        self
    }

    /// Scanned directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base name of the coverage database
    #[must_use]
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Accepted timestamp bounds, inclusive
    #[must_use]
    pub fn range(&self) -> (i64, i64) {
        (self.from, self.to)
    }

    /// Global recordings collected so far
    #[must_use]
    pub fn coverage_recording_files(&self) -> BTreeSet<FileRef> {
        self.recording_files.values().cloned().collect()
    }

    /// Per-test slices collected so far
    #[must_use]
    pub fn per_test_recording_files(&self) -> BTreeSet<FileRef> {
        self.per_test_files.values().cloned().collect()
    }

    /// Scan the directory
    pub fn collect_all_files(&mut self) -> SiftResult<()> {
        self.collect_unseen_files(None).map(|_| ())
    }

    /// Scan the directory, returning `(global, per_test)` files not already
    /// known to `previous`; everything `previous` knew is carried over
    pub fn collect_unseen_files(
        &mut self,
        previous: Option<&Self>,
    ) -> SiftResult<(BTreeSet<FileRef>, BTreeSet<FileRef>)> {
        let mut new_global = BTreeSet::new();
        let mut new_per_test = BTreeSet::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "recording directory does not exist");
                return Ok((new_global, new_per_test));
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(file) = parse_recording_name(&self.dir, name, &self.basename) else {
                continue;
            };

            if file.timestamp < self.from || file.timestamp > self.to {
                debug!(
                    file = name,
                    timestamp = file.timestamp,
                    from = self.from,
                    to = self.to,
                    "{} out of date coverage recording",
                    if self.delete_excluded { "deleting" } else { "ignoring" }
                );
                if self.delete_excluded {
                    if let Err(e) = fs::remove_file(&file.path) {
                        debug!(file = name, error = %e, "could not delete recording");
                    }
                }
                continue;
            }

            if file.is_test_recording() {
                let seen = previous.is_some_and(|p| p.per_test_files.contains_key(&file.path));
                if self.load_per_test_data && !seen {
                    self.per_test_files.insert(file.path.clone(), file.clone());
                    new_per_test.insert(file);
                }
            } else {
                let seen = previous.is_some_and(|p| p.recording_files.contains_key(&file.path));
                if !seen {
                    self.recording_files.insert(file.path.clone(), file.clone());
                    new_global.insert(file);
                }
            }
        }

        if let Some(previous) = previous {
            self.recording_files.extend(
                previous
                    .recording_files
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            self.per_test_files.extend(
                previous
                    .per_test_files
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        Ok((new_global, new_per_test))
    }

    /// True when a fresh scan would find a different set of global recordings
    pub fn is_out_of_date(&self) -> SiftResult<bool> {
        let mut latest = Self::new(self.dir.clone(), self.basename.clone())
            .with_range(self.from, self.to)
            .with_per_test_data(false);
        latest.collect_all_files()?;
        Ok(self.coverage_recording_files() != latest.coverage_recording_files())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::naming::{alternate_name, recording_name, slice_recording_name};

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    // =========================================================================
    // Name recognition
    // =========================================================================

    #[test]
    fn test_parse_global_name() {
        let dir = Path::new("/tmp");
        let name = recording_name(77, "cov.db", 1_000);
        let file = parse_recording_name(dir, &name, "cov.db").unwrap();
        assert_eq!(file.kind(), RecordingKind::Global);
        assert_eq!(file.hash(), 77);
        assert_eq!(file.timestamp(), 1_000);
        assert_eq!(file.path(), dir.join(&name));
    }

    #[test]
    fn test_parse_slice_name() {
        let name = slice_recording_name(2, 5, 1, -9, "cov.db", 4_000);
        let file = parse_recording_name(Path::new("."), &name, "cov.db").unwrap();
        assert!(file.is_test_recording());
        assert_eq!(file.typed_test_id(), Some((2 << 32) | 5));
        assert_eq!(file.hash(), 9);
        assert_eq!(file.timestamp(), 4_000);
    }

    #[test]
    fn test_name_patterns_compile_once() {
        let first = NamePatterns::shared().unwrap();
        let second = NamePatterns::shared().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(first.global.is_match("2s_9"));
        assert!(first.slice.is_match("1_0_7_u.s"));
    }

    #[test]
    fn test_rejects_alternates_and_foreign_names() {
        let dir = Path::new(".");
        let name = recording_name(1, "cov.db", 2);
        assert!(parse_recording_name(dir, &alternate_name(&name), "cov.db").is_none());
        assert!(parse_recording_name(dir, "cov.db", "cov.db").is_none());
        assert!(parse_recording_name(dir, "cov.db.snapshot", "cov.db").is_none());
        assert!(parse_recording_name(dir, "other1_2", "cov.db").is_none());
        assert!(parse_recording_name(dir, "cov.dbAB_2", "cov.db").is_none());
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    #[test]
    fn test_collect_splits_kinds_and_range() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &recording_name(1, "db", 100));
        touch(tmp.path(), &recording_name(2, "db", 5));
        touch(tmp.path(), &slice_recording_name(1, 1, 0, 1, "db", 150));
        touch(tmp.path(), "unrelated.txt");

        let mut filter = RecordingFilter::new(tmp.path(), "db").with_range(50, 200);
        filter.collect_all_files().unwrap();
        assert_eq!(filter.coverage_recording_files().len(), 1);
        assert_eq!(filter.per_test_recording_files().len(), 1);
        // out of range files are left alone without deletion
        assert!(tmp.path().join(recording_name(2, "db", 5)).exists());
    }

    #[test]
    fn test_delete_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let old = recording_name(2, "db", 5);
        touch(tmp.path(), &old);
        let mut filter = RecordingFilter::new(tmp.path(), "db")
            .with_range(50, 200)
            .with_delete_excluded(true);
        filter.collect_all_files().unwrap();
        assert!(!tmp.path().join(old).exists());
    }

    #[test]
    fn test_per_test_data_can_be_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &slice_recording_name(1, 1, 0, 1, "db", 150));
        let mut filter = RecordingFilter::new(tmp.path(), "db").with_per_test_data(false);
        filter.collect_all_files().unwrap();
        assert!(filter.per_test_recording_files().is_empty());
    }

    #[test]
    fn test_collect_unseen_and_out_of_date() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &recording_name(1, "db", 100));
        let mut first = RecordingFilter::new(tmp.path(), "db");
        first.collect_all_files().unwrap();
        assert!(!first.is_out_of_date().unwrap());

        touch(tmp.path(), &recording_name(2, "db", 200));
        touch(tmp.path(), &slice_recording_name(3, 4, 0, 1, "db", 210));
        assert!(first.is_out_of_date().unwrap());

        let mut second = RecordingFilter::new(tmp.path(), "db");
        let (new_global, new_slices) = second.collect_unseen_files(Some(&first)).unwrap();
        assert_eq!(new_global.len(), 1);
        assert_eq!(new_global.iter().next().unwrap().timestamp(), 200);
        assert_eq!(new_slices.len(), 1);
        assert_eq!(second.coverage_recording_files().len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let mut filter = RecordingFilter::new("/definitely/not/a/dir", "db");
        filter.collect_all_files().unwrap();
        assert!(filter.coverage_recording_files().is_empty());
    }
}
