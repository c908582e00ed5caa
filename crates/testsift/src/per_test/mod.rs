//! Per-test coverage index.
//!
//! Answers "what did these tests hit" and "which tests hit this region"
//! over the shared slot address space. Two implementations share one
//! contract:
//!
//! - [`EagerPerTestCoverage`] keeps every test's bitset in memory
//! - [`SamplingPerTestCoverage`] keeps only a per-file sample of which tests
//!   touched each file, and loads full bitsets from disk on demand through
//!   a byte-bounded [`SizedLruCache`]
//!
//! Queries never fail: a bitset that cannot be loaded is logged and the
//! test is left out of that one answer.

mod cache;
mod eager;
mod sampling;

#[cfg(test)]
mod tests;

pub use cache::{CacheStats, CacheWeight, SizedLruCache};
pub use eager::EagerPerTestCoverage;
pub use sampling::SamplingPerTestCoverage;

use crate::coverage::{CoverageBitSet, SlotRange};
use crate::identity::TestIdentity;
use crate::recording::PerTestTranscript;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Aggregate masks over every known test
///
/// Computing them touches every test's bitset, so implementations build
/// them lazily and keep them until coverage is added again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageMasks {
    all: CoverageBitSet,
    pass_only: CoverageBitSet,
    not_unique: CoverageBitSet,
}

impl CoverageMasks {
    /// Fold one test's complete hits into the masks
    pub(crate) fn accumulate(&mut self, hits: &CoverageBitSet, passed: bool) {
        let mut seen_before = self.all.clone();
        seen_before.intersect_with(hits);
        self.not_unique.union_with(&seen_before);
        self.all.union_with(hits);
        if passed {
            self.pass_only.union_with(hits);
        }
    }

    /// Slots hit by any test
    #[must_use]
    pub fn all(&self) -> &CoverageBitSet {
        &self.all
    }

    /// Slots hit by passing tests
    #[must_use]
    pub fn pass_only(&self) -> &CoverageBitSet {
        &self.pass_only
    }

    /// Slots hit by more than one test
    #[must_use]
    pub fn not_unique(&self) -> &CoverageBitSet {
        &self.not_unique
    }
}

/// Coverage attributed to individual tests
pub trait PerTestCoverage: fmt::Debug {
    /// Record the coverage of one test execution read from `recording`
    ///
    /// Adding the same recording again replaces what it contributed.
    fn add_coverage(&mut self, recording: &Path, transcript: &PerTestTranscript);

    /// Every test with coverage
    fn tests(&self) -> BTreeSet<TestIdentity>;

    /// Whether any coverage was added
    fn has_per_test_data(&self) -> bool {
        !self.tests().is_empty()
    }

    /// Slots hit by one test
    fn hits_for(&self, test: &TestIdentity) -> CoverageBitSet;

    /// Slots hit by any of `tests`
    fn hits_for_set(&self, tests: &BTreeSet<TestIdentity>) -> CoverageBitSet {
        let mut hits = CoverageBitSet::new();
        for test in tests {
            hits.union_with(&self.hits_for(test));
        }
        hits
    }

    /// Slots inside `range` hit by any of `tests`
    fn hits_for_set_in(&self, tests: &BTreeSet<TestIdentity>, range: SlotRange) -> CoverageBitSet {
        self.hits_for_set(tests).masked(range)
    }

    /// Aggregate masks, built on first use
    fn masks(&self) -> &CoverageMasks;

    /// Slots hit by `test` and by no other test
    fn unique_hits_for(&self, test: &TestIdentity) -> CoverageBitSet {
        let mut hits = self.hits_for(test);
        hits.difference_with(self.masks().not_unique());
        hits
    }

    /// Slots hit by `tests` and by no test outside the set
    fn unique_hits_for_set(&self, tests: &BTreeSet<TestIdentity>) -> CoverageBitSet {
        let others: BTreeSet<TestIdentity> = self.tests().difference(tests).cloned().collect();
        let mut hits = self.hits_for_set(tests);
        hits.difference_with(&self.hits_for_set(&others));
        hits
    }

    /// Tests with at least one hit inside `range`
    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestIdentity>;

    /// Full hits of every test with at least one hit inside `range`
    fn map_tests_and_coverage_for_region(
        &self,
        range: SlotRange,
    ) -> BTreeMap<TestIdentity, CoverageBitSet>;

    /// Slots hit by any test
    fn all_hits(&self) -> CoverageBitSet {
        self.masks().all().clone()
    }

    /// Slots hit by passing tests
    fn pass_only_hits(&self) -> CoverageBitSet {
        self.masks().pass_only().clone()
    }
}
