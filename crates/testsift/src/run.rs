//! Coverage collated from the recordings of one test run.

use crate::config::SamplingConfig;
use crate::identity::TestOutcome;
use crate::per_test::{EagerPerTestCoverage, PerTestCoverage, SamplingPerTestCoverage};
use crate::recording::{GlobalRecording, PerTestTranscript, Recording, RecordingFilter, TraceFilter};
use crate::registry::SourceRegistry;
use crate::result::SiftResult;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counts from one [`CoverageRun::collate`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollateStats {
    /// Global recordings merged
    pub global_recordings: usize,
    /// Per-test recordings added
    pub per_test_recordings: usize,
    /// Recordings that could not be read or were of the wrong kind
    pub skipped: usize,
}

/// Test outcomes and coverage of a run, ready to update a snapshot
#[derive(Debug)]
pub struct CoverageRun {
    hit_counts: Vec<u64>,
    outcomes: Vec<TestOutcome>,
    coverage: Box<dyn PerTestCoverage>,
    trace_filter: Option<TraceFilter>,
}

impl CoverageRun {
    /// Run backed by the given per-test index
    #[must_use]
    pub fn new(coverage: Box<dyn PerTestCoverage>) -> Self {
        Self {
            hit_counts: Vec::new(),
            outcomes: Vec::new(),
            coverage,
            trace_filter: None,
        }
    }

    /// Run keeping all per-test coverage in memory
    #[must_use]
    pub fn eager() -> Self {
        Self::new(Box::new(EagerPerTestCoverage::new()))
    }

    /// Run with a sampling index over `registry`
    #[must_use]
    pub fn sampling(registry: &dyn SourceRegistry, config: &SamplingConfig) -> Self {
        Self::new(Box::new(SamplingPerTestCoverage::new(registry, config)))
    }

    /// Filter stack traces of failed tests as they are added
    #[must_use]
    pub fn with_trace_filter(mut self, filter: TraceFilter) -> Self {
        self.trace_filter = Some(filter);
        self
    }

    /// Merge a global recording's counters
    pub fn add_global(&mut self, recording: &GlobalRecording) {
        let counts = recording.hit_counts();
        if counts.len() > self.hit_counts.len() {
            self.hit_counts.resize(counts.len(), 0);
        }
        for (mine, theirs) in self.hit_counts.iter_mut().zip(counts) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    /// Add one test execution read from `path`
    pub fn add_slice(&mut self, path: &Path, mut transcript: PerTestTranscript) {
        if let Some(filter) = &self.trace_filter {
            transcript.filter_stack_trace(filter, true);
        }
        if !transcript.is_passed() {
            debug!(
                test = %transcript.test(),
                status = ?transcript.status(),
                message = transcript.exit_message().unwrap_or_default(),
                "recorded failing test"
            );
        }
        self.outcomes.push(transcript.outcome());
        self.coverage.add_coverage(path, &transcript);
    }

    /// Read every recording the filter has collected
    ///
    /// Unreadable recordings are logged and skipped.
    pub fn collate(&mut self, filter: &RecordingFilter) -> CollateStats {
        let started = Instant::now();
        let mut stats = CollateStats::default();

        for file in filter.coverage_recording_files() {
            match file.read() {
                Ok(Recording::Global(rec)) => {
                    self.add_global(&rec);
                    stats.global_recordings += 1;
                }
                Ok(Recording::Slice(_)) => stats.skipped += 1,
                Err(e) => {
                    warn!(path = %file.path().display(), error = %e, "failed to load coverage recording");
                    stats.skipped += 1;
                }
            }
        }

        for file in filter.per_test_recording_files() {
            match file.read() {
                Ok(Recording::Slice(transcript)) => {
                    self.add_slice(file.path(), transcript);
                    stats.per_test_recordings += 1;
                }
                Ok(Recording::Global(_)) => stats.skipped += 1,
                Err(e) => {
                    debug!(path = %file.path().display(), error = %e, "failed to load per-test coverage recording");
                    stats.skipped += 1;
                }
            }
        }

        info!(
            global = stats.global_recordings,
            per_test = stats.per_test_recordings,
            skipped = stats.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collated coverage recordings"
        );
        stats
    }

    /// Scan `dir` for recordings of `basename` and collate them
    pub fn load(
        dir: &Path,
        basename: &str,
        registry: &dyn SourceRegistry,
        config: &SamplingConfig,
    ) -> SiftResult<Self> {
        let mut filter = RecordingFilter::new(dir, basename);
        filter.collect_all_files()?;
        let mut run = Self::sampling(registry, config);
        run.collate(&filter);
        Ok(run)
    }

    /// Outcomes ordered by end time
    #[must_use]
    pub fn outcomes(&self) -> Vec<&TestOutcome> {
        let mut outcomes: Vec<&TestOutcome> = self.outcomes.iter().collect();
        outcomes.sort_by_key(|outcome| (outcome.end_ms, outcome.start_ms));
        outcomes
    }

    /// Per-test coverage of the run
    #[must_use]
    pub fn coverage(&self) -> &dyn PerTestCoverage {
        self.coverage.as_ref()
    }

    /// Summed per-slot counters from global recordings
    #[must_use]
    pub fn hit_counts(&self) -> &[u64] {
        &self.hit_counts
    }
}
