//! testsift: incremental regression test selection
//!
//! Decides which tests can be skipped because nothing they depend on changed
//! since they last passed, and in what order the rest should run to surface
//! failures fastest.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Recordings  │   │ CoverageRun  │   │   Snapshot   │   │  Optimizer   │
//! │  (global +   │──►│ outcomes +   │──►│ tests ↔ files│──►│ minimize +   │
//! │  per-test)   │   │ per-test idx │   │ fingerprints │   │ fail-fast    │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!                                              ▲
//!                                     ┌────────┴───────┐
//!                                     │ SourceRegistry │
//!                                     └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use testsift::{
//!     ClassOptimizable, LocalSnapshotOptimizer, OptimizationOptions, Optimizer,
//! };
//!
//! let options = OptimizationOptions::builder()
//!     .snapshot_and_registry_from("build/coverage.db")
//!     .build();
//! let optimizer = LocalSnapshotOptimizer::from_options(options);
//! let units = vec![
//!     ClassOptimizable::new("com.foo.BarTest"),
//!     ClassOptimizable::new("com.foo.BazTest"),
//! ];
//! let to_run = optimizer.optimize(units);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod coverage;
pub mod identity;
pub mod logging;
pub mod optimizer;
pub mod per_test;
pub mod recording;
pub mod registry;
mod result;
pub mod run;
pub mod snapshot;

#[cfg(test)]
mod test_support;

pub use config::{
    snapshot_file_for, LogLevel, OptimizationOptions, OptimizationOptionsBuilder, SamplingConfig,
    TestSortOrder, SNAPSHOT_SUFFIX,
};
pub use coverage::{CoverageBitSet, SlotRange};
pub use identity::{ExitStatus, TestIdentity, TestOutcome};
pub use logging::LogFormat;
pub use optimizer::{
    ClassOptimizable, LocalSnapshotOptimizer, Optimizable, OptimizationSession, Optimizer,
    PathOptimizable, SuiteOptimizable,
};
pub use per_test::{
    CacheStats, CoverageMasks, EagerPerTestCoverage, PerTestCoverage, SamplingPerTestCoverage,
    SizedLruCache,
};
pub use recording::{
    FileRef, GlobalRecording, PerTestTranscript, Recording, RecordingFilter, RecordingHeader,
    TraceFilter,
};
pub use registry::{ManifestRegistry, SourceFile, SourceFingerprint, SourceRegistry};
pub use result::{SiftError, SiftResult};
pub use run::{CollateStats, CoverageRun};
pub use snapshot::{Snapshot, SnapshotPrinter, TOOL_VERSION, UNKNOWN_DURATION};
