//! Behaviour shared by both index implementations.

use super::*;
use crate::config::SamplingConfig;
use crate::identity::ExitStatus;
use crate::registry::{ManifestRegistry, SourceFile, SourceFingerprint};
use proptest::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn registry() -> ManifestRegistry {
    // three files of 20 slots, a method entry every 5 slots
    let files = (0..3u32)
        .map(|i| {
            let start = i * 20;
            SourceFile::new(
                format!("pkg/File{i}.java"),
                SourceFingerprint::new(u64::from(i), 100),
                SlotRange::new(start, 20),
                vec![start, start + 5, start + 10, start + 15],
            )
        })
        .collect();
    ManifestRegistry::new(1, files)
}

fn test_id(method: &str) -> TestIdentity {
    TestIdentity::declared("pkg.SuiteTest", method, "pkg/SuiteTest.java")
}

/// Recording for `method` hitting `slots`
fn recording(method: &str, status: ExitStatus, slots: &[u32]) -> PerTestTranscript {
    PerTestTranscript::new(1, test_id(method), 0, 10, status, slots.iter().copied().collect())
}

struct Both {
    dir: TempDir,
    eager: EagerPerTestCoverage,
    sampling: SamplingPerTestCoverage,
}

impl Both {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            eager: EagerPerTestCoverage::new(),
            sampling: SamplingPerTestCoverage::new(&registry(), &SamplingConfig::default()),
        }
    }

    fn add(&mut self, name: &str, transcript: &PerTestTranscript) {
        let path: PathBuf = self.dir.path().join(name);
        transcript.write_to(&path).unwrap();
        self.eager.add_coverage(&path, transcript);
        self.sampling.add_coverage(&path, transcript);
    }

    fn each(&self) -> [&dyn PerTestCoverage; 2] {
        [&self.eager, &self.sampling]
    }
}

// =============================================================================
// Unique coverage
// =============================================================================

#[test]
fn test_unique_hits_exclude_shared_slots() {
    let mut both = Both::new();
    both.add("t1.s", &recording("t1", ExitStatus::Passed, &[5, 9]));
    both.add("t2.s", &recording("t2", ExitStatus::Passed, &[5]));
    for index in both.each() {
        let unique = index.unique_hits_for(&test_id("t1"));
        assert!(unique.get(9), "{index:?}");
        assert!(!unique.get(5), "{index:?}");
        assert!(index.unique_hits_for(&test_id("t2")).is_empty());
    }
}

#[test]
fn test_unique_hits_for_set_subtracts_outsiders_only() {
    let mut both = Both::new();
    both.add("t1.s", &recording("t1", ExitStatus::Passed, &[5, 9]));
    both.add("t2.s", &recording("t2", ExitStatus::Passed, &[5, 25]));
    both.add("t3.s", &recording("t3", ExitStatus::Passed, &[25]));
    let set: BTreeSet<_> = [test_id("t1"), test_id("t2")].into_iter().collect();
    for index in both.each() {
        let unique = index.unique_hits_for_set(&set);
        assert_eq!(unique.iter().collect::<Vec<_>>(), vec![5, 9]);
    }
}

// =============================================================================
// Aggregates and range queries
// =============================================================================

#[test]
fn test_all_and_pass_only_hits() {
    let mut both = Both::new();
    both.add("t1.s", &recording("t1", ExitStatus::Passed, &[0, 1]));
    both.add("t2.s", &recording("t2", ExitStatus::Failed, &[20, 21]));
    for index in both.each() {
        assert_eq!(index.all_hits().iter().collect::<Vec<_>>(), vec![0, 1, 20, 21]);
        assert_eq!(index.pass_only_hits().iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(index.has_per_test_data());
        assert_eq!(index.tests().len(), 2);
    }
}

#[test]
fn test_hits_for_set_in_range() {
    let mut both = Both::new();
    both.add("t1.s", &recording("t1", ExitStatus::Passed, &[0, 1, 20]));
    both.add("t2.s", &recording("t2", ExitStatus::Passed, &[40, 41]));
    let set: BTreeSet<_> = [test_id("t1"), test_id("t2")].into_iter().collect();
    for index in both.each() {
        assert_eq!(index.hits_for_set(&set).cardinality(), 5);
        let ranged = index.hits_for_set_in(&set, SlotRange::new(15, 30));
        assert_eq!(ranged.iter().collect::<Vec<_>>(), vec![20, 40, 41]);
    }
}

#[test]
fn test_tests_covering_and_region_map() {
    let mut both = Both::new();
    both.add("t1.s", &recording("t1", ExitStatus::Passed, &[0, 1]));
    both.add("t2.s", &recording("t2", ExitStatus::Passed, &[20, 22, 23]));
    for index in both.each() {
        let covering = index.tests_covering(SlotRange::new(20, 20));
        assert_eq!(covering.into_iter().collect::<Vec<_>>(), vec![test_id("t2")]);

        let region = index.map_tests_and_coverage_for_region(SlotRange::new(22, 2));
        assert_eq!(region.len(), 1);
        assert_eq!(region[&test_id("t2")].cardinality(), 3);

        assert!(index.tests_covering(SlotRange::new(2, 10)).is_empty());
        assert!(index.tests_covering(SlotRange::new(0, 0)).is_empty());
    }
}

// =============================================================================
// Sampling agrees with eager
// =============================================================================

/// Coverage that respects the method-entry rule: a slot is only hit if the
/// entry slot of its method (every 5th slot) is also hit
fn entry_respecting_slots() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec((0u32..12, 0u32..5), 0..8).prop_map(|methods| {
        let mut slots: Vec<u32> = methods
            .into_iter()
            .flat_map(|(method, depth)| (0..=depth).map(move |offset| method * 5 + offset))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_sampling_matches_eager(
        coverage in prop::collection::vec(entry_respecting_slots(), 1..5),
        start in 0u32..60,
        len in 0u32..25,
    ) {
        let mut both = Both::new();
        for (i, slots) in coverage.iter().enumerate() {
            let status = if i % 2 == 0 { ExitStatus::Passed } else { ExitStatus::Failed };
            both.add(&format!("t{i}.s"), &recording(&format!("t{i}"), status, slots));
        }
        let range = SlotRange::new(start, len);
        prop_assert_eq!(both.eager.tests_covering(range), both.sampling.tests_covering(range));
        prop_assert_eq!(both.eager.all_hits(), both.sampling.all_hits());
        prop_assert_eq!(both.eager.pass_only_hits(), both.sampling.pass_only_hits());
        for test in both.eager.tests() {
            prop_assert_eq!(both.eager.unique_hits_for(&test), both.sampling.unique_hits_for(&test));
        }
    }
}
