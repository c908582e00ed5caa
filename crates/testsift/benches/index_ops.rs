//! Per-Test Coverage Index Benchmarks
//!
//! Compares the eager and sampling indexes on region queries.
//!
//! Run with: `cargo bench --bench index_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use testsift::{
    CoverageBitSet, EagerPerTestCoverage, ExitStatus, ManifestRegistry, PerTestCoverage,
    PerTestTranscript, SamplingConfig, SamplingPerTestCoverage, SlotRange, SourceFile,
    SourceFingerprint, TestIdentity,
};

const FILES: u32 = 200;
const FILE_SLOTS: u32 = 50;

fn registry() -> ManifestRegistry {
    let files = (0..FILES)
        .map(|i| {
            let start = i * FILE_SLOTS;
            SourceFile::new(
                format!("pkg/File{i}.java"),
                SourceFingerprint::new(u64::from(i), 1000),
                SlotRange::new(start, FILE_SLOTS),
                (0..FILE_SLOTS).step_by(10).map(|o| start + o).collect(),
            )
        })
        .collect();
    ManifestRegistry::new(1, files)
}

/// Each test hits the method entries of a handful of files
fn transcript(n: u32) -> PerTestTranscript {
    let coverage: CoverageBitSet = (0..5)
        .flat_map(|k| {
            let start = ((n * 7 + k * 13) % FILES) * FILE_SLOTS;
            [start, start + 1, start + 10, start + 11]
        })
        .collect();
    PerTestTranscript::new(
        1,
        TestIdentity::declared("pkg.BenchTest", format!("t{n}"), "pkg/BenchTest.java"),
        0,
        1,
        ExitStatus::Passed,
        coverage,
    )
}

fn populate(index: &mut dyn PerTestCoverage, dir: &Path, tests: u32) {
    for n in 0..tests {
        let t = transcript(n);
        let path = dir.join(format!("t{n}.s"));
        t.write_to(&path).expect("write recording");
        index.add_coverage(&path, &t);
    }
}

fn bench_tests_covering(c: &mut Criterion) {
    let mut group = c.benchmark_group("tests_covering");
    let registry = registry();

    for tests in [100u32, 1000] {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut eager = EagerPerTestCoverage::new();
        populate(&mut eager, dir.path(), tests);
        let mut sampling = SamplingPerTestCoverage::new(&registry, &SamplingConfig::default());
        populate(&mut sampling, dir.path(), tests);

        let range = SlotRange::new(17 * FILE_SLOTS, FILE_SLOTS);
        group.bench_with_input(BenchmarkId::new("eager", tests), &range, |bench, &r| {
            bench.iter(|| black_box(eager.tests_covering(black_box(r))));
        });
        group.bench_with_input(BenchmarkId::new("sampling", tests), &range, |bench, &r| {
            bench.iter(|| black_box(sampling.tests_covering(black_box(r))));
        });
    }

    group.finish();
}

fn bench_masks(c: &mut Criterion) {
    let mut group = c.benchmark_group("masks");
    // eager never reads the recording back, so no files are needed
    let transcripts: Vec<_> = (0..1000).map(transcript).collect();

    group.bench_function("eager_rebuild_1000", |bench| {
        bench.iter(|| {
            let mut eager = EagerPerTestCoverage::new();
            for (n, t) in transcripts.iter().enumerate() {
                eager.add_coverage(Path::new(&format!("t{n}.s")), t);
            }
            black_box(eager.masks().not_unique().cardinality());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_tests_covering, bench_masks);
criterion_main!(benches);
