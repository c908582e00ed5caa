//! In-memory per-test coverage.

use super::{CoverageMasks, PerTestCoverage};
use crate::coverage::{CoverageBitSet, SlotRange};
use crate::identity::TestIdentity;
use crate::recording::PerTestTranscript;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Default)]
struct TestHits {
    passed: bool,
    by_recording: BTreeMap<PathBuf, CoverageBitSet>,
    /// Union over `by_recording`
    hits: CoverageBitSet,
}

impl TestHits {
    fn rebuild(&mut self) {
        let mut hits = CoverageBitSet::new();
        for bits in self.by_recording.values() {
            hits.union_with(bits);
        }
        self.hits = hits;
    }
}

/// Holds every test's full bitset in memory
///
/// Suited to small projects and to tests of the sampling index.
#[derive(Debug, Default)]
pub struct EagerPerTestCoverage {
    tests: BTreeMap<TestIdentity, TestHits>,
    masks: OnceLock<CoverageMasks>,
}

impl EagerPerTestCoverage {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the most recent execution of `test` passed
    #[must_use]
    pub fn passed(&self, test: &TestIdentity) -> Option<bool> {
        self.tests.get(test).map(|entry| entry.passed)
    }
}

impl PerTestCoverage for EagerPerTestCoverage {
    fn add_coverage(&mut self, recording: &Path, transcript: &PerTestTranscript) {
        let entry = self.tests.entry(transcript.test().clone()).or_default();
        entry.passed = transcript.is_passed();
        entry
            .by_recording
            .insert(recording.to_path_buf(), transcript.coverage().clone());
        entry.rebuild();
        self.masks.take();
    }

    fn tests(&self) -> BTreeSet<TestIdentity> {
        self.tests.keys().cloned().collect()
    }

    fn has_per_test_data(&self) -> bool {
        !self.tests.is_empty()
    }

    fn hits_for(&self, test: &TestIdentity) -> CoverageBitSet {
        self.tests
            .get(test)
            .map(|entry| entry.hits.clone())
            .unwrap_or_default()
    }

    fn masks(&self) -> &CoverageMasks {
        self.masks.get_or_init(|| {
            let mut masks = CoverageMasks::default();
            for entry in self.tests.values() {
                masks.accumulate(&entry.hits, entry.passed);
            }
            masks
        })
    }

    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestIdentity> {
        self.tests
            .iter()
            .filter(|(_, entry)| entry.hits.any_in(range))
            .map(|(test, _)| test.clone())
            .collect()
    }

    fn map_tests_and_coverage_for_region(
        &self,
        range: SlotRange,
    ) -> BTreeMap<TestIdentity, CoverageBitSet> {
        self.tests
            .iter()
            .filter(|(_, entry)| entry.hits.any_in(range))
            .map(|(test, entry)| (test.clone(), entry.hits.clone()))
            .collect()
    }
}
