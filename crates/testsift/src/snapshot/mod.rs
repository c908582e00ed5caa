//! Coverage snapshot: what each test touched the last time it ran.
//!
//! A [`Snapshot`] correlates tests with the source files they covered,
//! remembers how long each test took and whether it failed, and keeps the
//! fingerprint every covered file had at the time. The optimizer compares
//! those fingerprints with the registry to decide whether a test is
//! affected by changes.
//!
//! Every identity stored in `durations`, `failing_tests` or
//! `per_test_source_states` is reachable through `test_lookup` under each
//! of its [`TestIdentity::lookup_names`].

mod printer;
mod store;

pub use printer::SnapshotPrinter;
pub use store::{SNAPSHOT_MAGIC, SNAPSHOT_SCHEMA_VERSION};

use crate::identity::TestIdentity;
use crate::optimizer::OptimizationSession;
use crate::registry::{SourceFingerprint, SourceRegistry};
use crate::run::CoverageRun;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Version of the tool that wrote a snapshot
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Duration recorded for a test whose duration is not known
pub const UNKNOWN_DURATION: i64 = i64::MIN;

/// Persisted test/source correlation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    tool_version: String,
    /// Registry versions this snapshot was updated for, oldest first, no repeats
    db_versions: Vec<u64>,
    test_lookup: BTreeMap<String, BTreeSet<TestIdentity>>,
    durations: BTreeMap<TestIdentity, i64>,
    failing_tests: BTreeSet<TestIdentity>,
    per_test_source_states: BTreeMap<TestIdentity, BTreeMap<String, SourceFingerprint>>,
    avg_setup_teardown_duration: i64,
    #[serde(skip)]
    location: Option<PathBuf>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            tool_version: TOOL_VERSION.to_string(),
            db_versions: Vec::new(),
            test_lookup: BTreeMap::new(),
            durations: BTreeMap::new(),
            failing_tests: BTreeSet::new(),
            per_test_source_states: BTreeMap::new(),
            avg_setup_teardown_duration: 0,
            location: None,
        }
    }
}

impl Snapshot {
    /// Empty snapshot to be stored at `location`
    #[must_use]
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    /// Snapshot populated from a first run
    #[must_use]
    pub fn generate_for(
        location: impl Into<PathBuf>,
        registry: &dyn SourceRegistry,
        run: &CoverageRun,
    ) -> Self {
        let mut snapshot = Self::new(location);
        snapshot.update_for(registry, run);
        snapshot
    }

    // =========================================================================
    // Updating
    // =========================================================================

    /// Fold the results and coverage of `run` into the snapshot
    pub fn update_for(&mut self, registry: &dyn SourceRegistry, run: &CoverageRun) {
        let first_population = self.db_versions.is_empty();
        let outcomes = run.outcomes();

        let mut earliest_start = i64::MAX;
        let mut latest_end = 0i64;
        let mut total_duration = 0i64;

        for outcome in &outcomes {
            let test = &outcome.test;
            let duration = outcome.duration_ms();
            earliest_start = earliest_start.min(outcome.start_ms);
            latest_end = latest_end.max(outcome.end_ms);
            total_duration = total_duration.saturating_add(duration);

            for name in test.lookup_names() {
                self.test_lookup.entry(name).or_default().insert(test.clone());
            }
            if outcome.is_success() {
                self.failing_tests.remove(test);
            } else {
                self.failing_tests.insert(test.clone());
            }
            self.durations.insert(test.clone(), duration);
        }

        if first_population {
            self.avg_setup_teardown_duration = Self::average_setup_teardown(
                self.durations.len(),
                earliest_start,
                latest_end,
                total_duration,
            );
        }

        self.correlate_sources(registry, run);

        let version = registry.version();
        if !self.db_versions.contains(&version) {
            self.db_versions.push(version);
        }
        debug!(
            tests = outcomes.len(),
            db_version = version,
            db_versions = self.db_versions.len(),
            "updated snapshot"
        );
    }

    fn average_setup_teardown(
        tests: usize,
        earliest_start: i64,
        latest_end: i64,
        total_duration: i64,
    ) -> i64 {
        if tests > 1 && total_duration > 0 && latest_end > earliest_start {
            let overhead = latest_end
                .saturating_sub(earliest_start)
                .saturating_sub(total_duration);
            (overhead / (tests as i64 - 1)).max(0)
        } else {
            0
        }
    }

    /// Record the current fingerprint of every file each known test covered
    ///
    /// Tests that ran with per-test coverage start over, so files they no
    /// longer touch stop affecting them.
    fn correlate_sources(&mut self, registry: &dyn SourceRegistry, run: &CoverageRun) {
        let coverage = run.coverage();
        for test in coverage.tests() {
            if let Some(states) = self.per_test_source_states.get_mut(&test) {
                states.clear();
            }
        }

        for file in registry.files() {
            for test in coverage.tests_covering(file.range) {
                if !self.is_known(&test) {
                    trace!(test = %test, path = %file.path, "coverage for test without result");
                    continue;
                }
                self.per_test_source_states
                    .entry(test)
                    .or_default()
                    .insert(file.path.clone(), file.fingerprint);
            }
        }
        self.per_test_source_states.retain(|_, states| !states.is_empty());
    }

    fn is_known(&self, test: &TestIdentity) -> bool {
        self.test_lookup
            .get(&test.source_method_name())
            .is_some_and(|tests| tests.contains(test))
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Whether the snapshot should be discarded
    #[must_use]
    pub fn is_too_stale(&self, max_optimized_builds: usize) -> bool {
        self.too_stale_reason(max_optimized_builds).is_some()
    }

    /// Why the snapshot should be discarded, if it should
    #[must_use]
    pub fn too_stale_reason(&self, max_optimized_builds: usize) -> Option<String> {
        if self.tool_version != TOOL_VERSION {
            return Some(format!(
                "snapshot was written by version {}, running {}",
                self.tool_version, TOOL_VERSION
            ));
        }
        let builds = self.db_versions.len().saturating_sub(1);
        (builds >= max_optimized_builds).then(|| {
            format!(
                "{builds} builds since the snapshot was generated (limit {max_optimized_builds})"
            )
        })
    }

    /// Whether any file `test` covered last time is gone or changed
    ///
    /// A test with no recorded files counts as affected. Every missing or
    /// changed path is added to the session's modified paths.
    pub fn is_affected_by_changes(
        &self,
        test: &TestIdentity,
        registry: &dyn SourceRegistry,
        session: &mut OptimizationSession,
    ) -> bool {
        let Some(states) = self.per_test_source_states.get(test) else {
            return true;
        };
        if states.is_empty() {
            return true;
        }
        let mut affected = false;
        for (path, recorded) in states {
            let modified = match registry.find_file(path) {
                None => true,
                Some(current) => recorded.changed_to(&current),
            };
            if modified {
                session.add_modified_path(path.clone());
                affected = true;
            }
        }
        affected
    }

    /// Estimated time to run `tests`, including per-test overhead
    pub fn duration_of<'a, I>(&self, tests: I) -> i64
    where
        I: IntoIterator<Item = &'a TestIdentity>,
    {
        let mut known = 0i64;
        let mut count = 0i64;
        for test in tests {
            count += 1;
            let duration = self.duration(test);
            if duration != UNKNOWN_DURATION {
                known = known.saturating_add(duration);
            }
        }
        known.saturating_add(count.saturating_mul(self.avg_setup_teardown_duration))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Last recorded duration of `test`, or [`UNKNOWN_DURATION`]
    #[must_use]
    pub fn duration(&self, test: &TestIdentity) -> i64 {
        self.durations.get(test).copied().unwrap_or(UNKNOWN_DURATION)
    }

    /// Whether `test` failed the last time it ran
    #[must_use]
    pub fn has_failed(&self, test: &TestIdentity) -> bool {
        self.failing_tests.contains(test)
    }

    /// Tests indexed under `name`
    #[must_use]
    pub fn lookup_tests(&self, name: &str) -> Option<&BTreeSet<TestIdentity>> {
        self.test_lookup.get(name)
    }

    /// Source paths of the failing tests
    #[must_use]
    pub fn failing_test_paths(&self) -> BTreeSet<String> {
        self.failing_tests
            .iter()
            .map(|test| test.package_path().to_string())
            .collect()
    }

    /// Covered file path to the tests that covered it
    #[must_use]
    pub fn file_to_tests(&self) -> BTreeMap<String, BTreeSet<TestIdentity>> {
        let mut files: BTreeMap<String, BTreeSet<TestIdentity>> = BTreeMap::new();
        for (test, states) in &self.per_test_source_states {
            for path in states.keys() {
                files.entry(path.clone()).or_default().insert(test.clone());
            }
        }
        files
    }

    /// Fingerprints recorded for `test`
    #[must_use]
    pub fn source_states(&self, test: &TestIdentity) -> Option<&BTreeMap<String, SourceFingerprint>> {
        self.per_test_source_states.get(test)
    }

    /// Highest registry version seen, or 0
    #[must_use]
    pub fn most_recent_db_version(&self) -> u64 {
        self.db_versions.iter().copied().max().unwrap_or(0)
    }

    /// Number of distinct registry versions seen
    #[must_use]
    pub fn db_version_count(&self) -> usize {
        self.db_versions.len()
    }

    /// Registry versions in the order they were first seen
    #[must_use]
    pub fn db_versions(&self) -> &[u64] {
        &self.db_versions
    }

    /// Number of tests with a recorded duration
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.durations.len()
    }

    /// Average overhead between tests, derived from the first run
    #[must_use]
    pub fn avg_setup_teardown_duration(&self) -> i64 {
        self.avg_setup_teardown_duration
    }

    /// Version of the tool that wrote the snapshot
    #[must_use]
    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    /// Where the snapshot is stored
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Change where the snapshot is stored
    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = Some(location.into());
    }

    #[cfg(test)]
    pub(crate) fn set_tool_version(&mut self, version: impl Into<String>) {
        self.tool_version = version.into();
    }
}
