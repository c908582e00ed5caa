//! Recording transcripts: the decoded contents of recording files.
//!
//! Two kinds exist. A [`GlobalRecording`] sums hit counters over a whole
//! run. A [`PerTestTranscript`] is the slice of coverage attributed to a
//! single test execution, together with how that test ended.
//!
//! ```text
//! header   : format u32 | db_version u64 | write_timestamp i64
//! global   : slot_count u32 | run_count u32 | runs (skip u32, len u32, counts u64*len)*
//! slice    : source_type str | runtime_type str | method str | package_path str
//!            | status i32 | [message str | trace str] | start i64 | duration f64
//!            | words u32 | word u64*
//! ```
//!
//! All integers are big-endian; strings are length-prefixed UTF-8. Files
//! hold the zlib-deflated encoding.

use super::header::{now_millis, RecordingHeader, GLOBAL_FORMAT, SLICE_FORMAT};
use super::wire::{WireReader, WireWriter};
use crate::coverage::CoverageBitSet;
use crate::identity::{ExitStatus, TestIdentity, TestOutcome};
use crate::result::{SiftError, SiftResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Read and inflate a recording file
pub(crate) fn read_deflated(path: &Path, context: &'static str) -> SiftResult<Vec<u8>> {
    let compressed = fs::read(path)?;
    let mut bytes = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut bytes)
        .map_err(|e| SiftError::decode(context, format!("corrupt deflate stream: {e}")))?;
    Ok(bytes)
}

/// Deflate and write a recording file, creating parent directories
pub(crate) fn write_deflated(path: &Path, bytes: &[u8]) -> SiftResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    fs::write(path, encoder.finish()?)?;
    Ok(())
}

// =============================================================================
// Global recordings
// =============================================================================

/// Largest slot count a global recording may declare
pub const MAX_SLOT_COUNT: usize = 1 << 24;

/// Hit counters for a whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRecording {
    header: RecordingHeader,
    hit_counts: Vec<u64>,
}

impl GlobalRecording {
    /// Create a recording for `db_version` stamped with the current time
    #[must_use]
    pub fn new(db_version: u64, hit_counts: Vec<u64>) -> Self {
        Self {
            header: RecordingHeader::new(db_version, now_millis(), GLOBAL_FORMAT),
            hit_counts,
        }
    }

    /// Create a recording with an explicit header
    #[must_use]
    pub fn with_header(header: RecordingHeader, hit_counts: Vec<u64>) -> Self {
        Self { header, hit_counts }
    }

    /// Header
    #[must_use]
    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Per-slot hit counters
    #[must_use]
    pub fn hit_counts(&self) -> &[u64] {
        &self.hit_counts
    }

    /// Slots with a non-zero counter
    #[must_use]
    pub fn coverage(&self) -> CoverageBitSet {
        CoverageBitSet::from_hit_counts(&self.hit_counts)
    }

    /// Add another recording's counters into this one
    pub fn accumulate(&mut self, other: &Self) {
        if other.hit_counts.len() > self.hit_counts.len() {
            self.hit_counts.resize(other.hit_counts.len(), 0);
        }
        for (mine, theirs) in self.hit_counts.iter_mut().zip(&other.hit_counts) {
            *mine = mine.saturating_add(*theirs);
        }
    }

    /// Encode to the uncompressed wire form; zero counters are run-length skipped
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut runs: Vec<(u32, &[u64])> = Vec::new();
        let mut idx = 0;
        let mut last_end = 0;
        while idx < self.hit_counts.len() {
            if self.hit_counts[idx] == 0 {
                idx += 1;
                continue;
            }
            let start = idx;
            while idx < self.hit_counts.len() && self.hit_counts[idx] != 0 {
                idx += 1;
            }
            runs.push(((start - last_end) as u32, &self.hit_counts[start..idx]));
            last_end = idx;
        }

        let mut out = WireWriter::new();
        self.header.write(&mut out);
        out.u32(self.hit_counts.len() as u32);
        out.u32(runs.len() as u32);
        for (skip, counts) in runs {
            out.u32(skip);
            out.u32(counts.len() as u32);
            for &count in counts {
                out.u64(count);
            }
        }
        out.into_bytes()
    }

    /// Decode the uncompressed wire form
    pub fn decode(bytes: &[u8]) -> SiftResult<Self> {
        let mut input = WireReader::new(bytes, "global recording");
        let header = RecordingHeader::read(&mut input, GLOBAL_FORMAT)?;
        let slot_count = input.u32()? as usize;
        if slot_count > MAX_SLOT_COUNT {
            return Err(SiftError::decode(
                "global recording",
                format!("slot count {slot_count} exceeds limit {MAX_SLOT_COUNT}"),
            ));
        }
        let run_count = input.u32()?;
        let mut hit_counts = Vec::new();
        for _ in 0..run_count {
            let skip = input.u32()? as usize;
            let len = input.u32()? as usize;
            if len > input.remaining() / 8 {
                return Err(SiftError::Truncated {
                    context: "global recording",
                });
            }
            // checked before growing so a forged run cannot force a huge allocation
            if hit_counts.len() + skip + len > slot_count {
                return Err(SiftError::decode(
                    "global recording",
                    format!("run of {len} after {skip} skipped exceeds slot count {slot_count}"),
                ));
            }
            hit_counts.resize(hit_counts.len() + skip, 0);
            for _ in 0..len {
                hit_counts.push(input.u64()?);
            }
        }
        hit_counts.resize(slot_count, 0);
        input.finish()?;
        Ok(Self { header, hit_counts })
    }

    /// Write to `path` (deflated)
    pub fn write_to(&self, path: &Path) -> SiftResult<()> {
        write_deflated(path, &self.encode())
    }

    /// Read from `path`
    pub fn read_from(path: &Path) -> SiftResult<Self> {
        Self::decode(&read_deflated(path, "global recording")?)
    }
}

// =============================================================================
// Per-test slices
// =============================================================================

/// Coverage and result of one test execution
#[derive(Debug, Clone, PartialEq)]
pub struct PerTestTranscript {
    header: RecordingHeader,
    test: TestIdentity,
    start_ms: i64,
    duration_ms: f64,
    status: ExitStatus,
    exit_message: Option<String>,
    stack_trace: Option<String>,
    coverage: CoverageBitSet,
}

impl PerTestTranscript {
    /// Create a transcript for a test that ran from `start_ms` to `end_ms`
    ///
    /// The header's write timestamp doubles as the test end time.
    #[must_use]
    pub fn new(
        db_version: u64,
        test: TestIdentity,
        start_ms: i64,
        end_ms: i64,
        status: ExitStatus,
        coverage: CoverageBitSet,
    ) -> Self {
        Self {
            header: RecordingHeader::new(db_version, end_ms, SLICE_FORMAT),
            test,
            start_ms,
            duration_ms: end_ms.saturating_sub(start_ms).max(0) as f64,
            status,
            exit_message: None,
            stack_trace: None,
            coverage,
        }
    }

    /// Attach a failure message and stack trace
    ///
    /// Ignored unless the status carries error info.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        if self.status.carries_error_info() {
            self.exit_message = Some(message.into());
            self.stack_trace = Some(stack_trace.into());
        }
        self
    }

    /// Override the measured duration (sub-millisecond precision)
    #[must_use]
    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Header
    #[must_use]
    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Test identity
    #[must_use]
    pub fn test(&self) -> &TestIdentity {
        &self.test
    }

    /// Start time (ms since epoch)
    #[must_use]
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// End time (ms since epoch)
    #[must_use]
    pub fn end_ms(&self) -> i64 {
        self.header.write_timestamp
    }

    /// Measured duration
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Exit status
    #[must_use]
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Whether a result was recorded at all
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.status != ExitStatus::NoResult
    }

    /// Whether the test passed
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status.is_success()
    }

    /// Failure message, if the test failed
    #[must_use]
    pub fn exit_message(&self) -> Option<&str> {
        self.exit_message.as_deref()
    }

    /// Stack trace, if the test failed
    #[must_use]
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// Slots hit by the test
    #[must_use]
    pub fn coverage(&self) -> &CoverageBitSet {
        &self.coverage
    }

    /// Take the coverage, dropping everything else
    #[must_use]
    pub fn into_coverage(self) -> CoverageBitSet {
        self.coverage
    }

    /// Whether the test hit a slot
    #[must_use]
    pub fn get(&self, slot: u32) -> bool {
        self.coverage.get(slot)
    }

    /// Outcome view used by snapshot updates
    #[must_use]
    pub fn outcome(&self) -> TestOutcome {
        TestOutcome::new(self.test.clone(), self.start_ms, self.end_ms(), self.status)
    }

    /// Replace the stored stack trace with a filtered one
    pub fn filter_stack_trace(&mut self, filter: &super::TraceFilter, enabled: bool) {
        if let Some(trace) = self.stack_trace.take() {
            self.stack_trace = Some(filter.apply(&trace, enabled));
        }
    }

    /// Encode to the uncompressed wire form
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = WireWriter::new();
        self.header.write(&mut out);
        out.str(self.test.source_type_name());
        out.str(self.test.runtime_type_name());
        out.str(self.test.method_name());
        out.str(self.test.package_path());
        out.i32(self.status.code());
        if self.status.carries_error_info() {
            out.str(self.exit_message.as_deref().unwrap_or_default());
            out.str(self.stack_trace.as_deref().unwrap_or_default());
        }
        out.i64(self.start_ms);
        out.f64(self.duration_ms);
        out.bitset(&self.coverage);
        out.into_bytes()
    }

    /// Decode the uncompressed wire form
    pub fn decode(bytes: &[u8]) -> SiftResult<Self> {
        let mut input = WireReader::new(bytes, "per-test recording");
        let header = RecordingHeader::read(&mut input, SLICE_FORMAT)?;
        let source_type = input.str()?;
        let runtime_type = input.str()?;
        let method = input.str()?;
        let package_path = input.str()?;
        let code = input.i32()?;
        let status = ExitStatus::from_code(code).ok_or_else(|| {
            SiftError::decode("per-test recording", format!("unknown exit status {code}"))
        })?;
        let (exit_message, stack_trace) = if status.carries_error_info() {
            (Some(input.str()?), Some(input.str()?))
        } else {
            (None, None)
        };
        let start_ms = input.i64()?;
        let duration_ms = input.f64()?;
        let coverage = input.bitset()?;
        input.finish()?;
        Ok(Self {
            header,
            test: TestIdentity::new(source_type, runtime_type, method, package_path),
            start_ms,
            duration_ms,
            status,
            exit_message,
            stack_trace,
            coverage,
        })
    }

    /// Write to `path` (deflated)
    pub fn write_to(&self, path: &Path) -> SiftResult<()> {
        write_deflated(path, &self.encode())
    }

    /// Read from `path`
    pub fn read_from(path: &Path) -> SiftResult<Self> {
        Self::decode(&read_deflated(path, "per-test recording")?)
    }
}
