//! Sampling per-test coverage.
//!
//! While coverage is added, each file region records which tests hit at
//! least one of its method entry slots. A region query first gathers those
//! sampled tests (a superset of the real answer), then loads each
//! candidate's full bitset through the cache to clip false positives.
//!
//! The sample has no false negatives only if every covered slot of a method
//! implies its entry slot is covered too. Instrumentation guarantees that
//! by counting the entry of every executed method.

use super::cache::SizedLruCache;
use super::{CoverageMasks, PerTestCoverage};
use crate::config::SamplingConfig;
use crate::coverage::{CoverageBitSet, SlotRange};
use crate::identity::TestIdentity;
use crate::recording::PerTestTranscript;
use crate::registry::SourceRegistry;
use crate::result::SiftResult;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Tests that hit a file region through one of its method entries
#[derive(Debug)]
struct RegionSample {
    method_entries: Vec<u32>,
    tests: BTreeSet<TestIdentity>,
}

impl RegionSample {
    fn sample(&mut self, test: &TestIdentity, coverage: &CoverageBitSet) {
        if self.method_entries.iter().any(|&slot| coverage.get(slot)) {
            self.tests.insert(test.clone());
        }
    }
}

#[derive(Debug, Default)]
struct SampledTest {
    passed: bool,
    recordings: BTreeSet<PathBuf>,
}

/// Per-test coverage backed by recordings on disk
#[derive(Debug)]
pub struct SamplingPerTestCoverage {
    /// Keyed by region start slot
    samples: BTreeMap<u32, RegionSample>,
    tests: BTreeMap<TestIdentity, SampledTest>,
    cache: SizedLruCache<PathBuf, CoverageBitSet>,
    masks: OnceLock<CoverageMasks>,
}

impl SamplingPerTestCoverage {
    /// Build an empty index over the files known to `registry`
    #[must_use]
    pub fn new(registry: &dyn SourceRegistry, config: &SamplingConfig) -> Self {
        let samples = registry
            .files()
            .map(|file| {
                (
                    file.range.start(),
                    RegionSample {
                        method_entries: file.method_entries.clone(),
                        tests: BTreeSet::new(),
                    },
                )
            })
            .collect();
        Self {
            samples,
            tests: BTreeMap::new(),
            cache: SizedLruCache::new(config.cache_capacity_bytes, config.expected_recordings),
            masks: OnceLock::new(),
        }
    }

    /// Cache backing full bitset loads
    #[must_use]
    pub fn cache(&self) -> &SizedLruCache<PathBuf, CoverageBitSet> {
        &self.cache
    }

    fn load(&self, recording: &Path) -> SiftResult<Arc<CoverageBitSet>> {
        self.cache.get_or_insert_with(&recording.to_path_buf(), || {
            debug!(path = %recording.display(), "loading per-test coverage");
            PerTestTranscript::read_from(recording).map(PerTestTranscript::into_coverage)
        })
    }

    /// Union of every readable recording of `test`
    fn union_for(&self, test: &TestIdentity, entry: &SampledTest) -> CoverageBitSet {
        let mut hits = CoverageBitSet::new();
        for recording in &entry.recordings {
            match self.load(recording) {
                Ok(bits) => hits.union_with(&bits),
                Err(e) => warn!(
                    path = %recording.display(),
                    test = %test,
                    error = %e,
                    "failed to load per-test coverage file"
                ),
            }
        }
        hits
    }

    /// Sampled tests for the regions overlapping `range`
    ///
    /// Takes every region starting in `[start, end]`, plus the region
    /// starting below `start` unless one starts exactly at `start`.
    fn candidates(&self, range: SlotRange) -> BTreeSet<&TestIdentity> {
        let start = range.start();
        let mut regions: Vec<&RegionSample> = self
            .samples
            .range(start..=range.end())
            .map(|(_, sample)| sample)
            .collect();
        if !self.samples.contains_key(&start) {
            if let Some((_, floor)) = self.samples.range(..start).next_back() {
                regions.push(floor);
            }
        }
        regions.iter().flat_map(|sample| sample.tests.iter()).collect()
    }

    fn hits_in_range(&self, test: &TestIdentity, range: SlotRange) -> bool {
        let Some(entry) = self.tests.get(test) else {
            return false;
        };
        entry.recordings.iter().any(|recording| match self.load(recording) {
            Ok(bits) => bits.any_in(range),
            Err(e) => {
                warn!(
                    path = %recording.display(),
                    range = %range,
                    error = %e,
                    "failed to load coverage file while calculating hits in range"
                );
                false
            }
        })
    }
}

impl PerTestCoverage for SamplingPerTestCoverage {
    fn add_coverage(&mut self, recording: &Path, transcript: &PerTestTranscript) {
        let test = transcript.test();
        for sample in self.samples.values_mut() {
            sample.sample(test, transcript.coverage());
        }
        let entry = self.tests.entry(test.clone()).or_default();
        entry.passed = transcript.is_passed();
        let recording = recording.to_path_buf();
        self.cache.invalidate(&recording);
        entry.recordings.insert(recording);
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
            .map(|entry| self.union_for(test, entry))
            .unwrap_or_default()
    }

    fn masks(&self) -> &CoverageMasks {
        self.masks.get_or_init(|| {
            let mut masks = CoverageMasks::default();
            for (test, entry) in &self.tests {
                masks.accumulate(&self.union_for(test, entry), entry.passed);
            }
            masks
        })
    }

    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestIdentity> {
        self.candidates(range)
            .into_iter()
            .filter(|test| self.hits_in_range(test, range))
            .cloned()
            .collect()
    }

    fn map_tests_and_coverage_for_region(
        &self,
        range: SlotRange,
    ) -> BTreeMap<TestIdentity, CoverageBitSet> {
        self.candidates(range)
            .into_iter()
            .filter_map(|test| {
                let hits = self.hits_for(test);
                hits.any_in(range).then(|| (test.clone(), hits))
            })
            .collect()
    }
}
