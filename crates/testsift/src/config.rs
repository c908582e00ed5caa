//! Configuration for test optimization and the per-test coverage index.
//!
//! Options can be built in code with [`OptimizationOptions::builder`] or
//! loaded from YAML/JSON:
//!
//! ```yaml
//! enabled: true
//! minimize: true
//! reorder: fail_fast
//! log_level: verbose
//! max_compiles_before_stale_snapshot: 10
//! registry_file: build/coverage.db
//! snapshot_file: build/coverage.db.snapshot
//! ```

use crate::result::{SiftError, SiftResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to a registry location to name its snapshot file
pub const SNAPSHOT_SUFFIX: &str = ".snapshot";

/// How much the optimizer reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Warnings and errors only
    Quiet,
    /// Summary lines
    #[default]
    Info,
    /// Per-run details such as modified files
    Verbose,
    /// Per-unit decisions and snapshot dumps
    Debug,
}

impl LogLevel {
    /// Whether debug-only work (snapshot dumps, per-unit reasons) should run
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Whether verbose details should be reported
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// `tracing` filter directive for this level
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Info => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
        }
    }
}

/// Order applied to the tests that survive minimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSortOrder {
    /// Keep the caller's order
    None,
    /// Failed, then affected, then fastest tests first
    #[default]
    FailFast,
    /// Uniform shuffle
    Random,
}

/// Options controlling test optimization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationOptions {
    /// Optimize at all; when false every unit runs in its original order
    pub enabled: bool,
    /// Exclude units whose tests passed and are unaffected by changes
    pub minimize: bool,
    /// Reordering of the surviving units
    pub reorder: TestSortOrder,
    /// Reporting level
    pub log_level: LogLevel,
    /// Optimized builds allowed before the snapshot is discarded
    pub max_compiles_before_stale_snapshot: usize,
    /// Noun used when reporting units, e.g. "test" or "class"
    pub optimizable_name: String,
    /// Snapshot location
    pub snapshot_file: Option<PathBuf>,
    /// Source registry manifest location
    pub registry_file: Option<PathBuf>,
    /// Seed for random reordering; entropy-seeded when absent
    pub shuffle_seed: Option<u64>,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            minimize: true,
            reorder: TestSortOrder::FailFast,
            log_level: LogLevel::Info,
            max_compiles_before_stale_snapshot: 10,
            optimizable_name: "test".to_string(),
            snapshot_file: None,
            registry_file: None,
            shuffle_seed: None,
        }
    }
}

impl OptimizationOptions {
    /// Start a builder with the defaults
    #[must_use]
    pub fn builder() -> OptimizationOptionsBuilder {
        OptimizationOptionsBuilder::default()
    }

    /// Whether any reordering happens
    #[must_use]
    pub fn is_reordering(&self) -> bool {
        self.reorder != TestSortOrder::None
    }

    /// Whether fail-fast reordering is selected
    #[must_use]
    pub fn is_reorder_failfast(&self) -> bool {
        self.reorder == TestSortOrder::FailFast
    }

    /// Whether random reordering is selected
    #[must_use]
    pub fn is_reorder_randomly(&self) -> bool {
        self.reorder == TestSortOrder::Random
    }

    /// Check option values
    pub fn validate(&self) -> SiftResult<()> {
        if self.max_compiles_before_stale_snapshot == 0 {
            return Err(SiftError::InvalidConfig {
                message: "max_compiles_before_stale_snapshot must be at least 1".to_string(),
            });
        }
        if self.optimizable_name.trim().is_empty() {
            return Err(SiftError::InvalidConfig {
                message: "optimizable_name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate YAML options
    pub fn from_yaml_str(yaml: &str) -> SiftResult<Self> {
        let options: Self = serde_yaml_ng::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse and validate JSON options
    pub fn from_json_str(json: &str) -> SiftResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file; JSON when the extension is `.json`, YAML otherwise
    pub fn load(path: &Path) -> SiftResult<Self> {
        let text = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }
}

/// Snapshot location paired with a registry location
#[must_use]
pub fn snapshot_file_for(registry: &Path) -> PathBuf {
    let mut name = registry.as_os_str().to_os_string();
    name.push(SNAPSHOT_SUFFIX);
    PathBuf::from(name)
}

/// Fluent builder for [`OptimizationOptions`]
#[derive(Debug, Clone, Default)]
pub struct OptimizationOptionsBuilder {
    options: OptimizationOptions,
}

impl OptimizationOptionsBuilder {
    /// Enable or disable optimization
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    /// Enable or disable minimization
    #[must_use]
    pub fn minimize(mut self, minimize: bool) -> Self {
        self.options.minimize = minimize;
        self
    }

    /// Failed, affected, then fastest first
    #[must_use]
    pub fn reorder_failfast(self) -> Self {
        self.reorder(TestSortOrder::FailFast)
    }

    /// Keep the caller's order
    #[must_use]
    pub fn dont_reorder(self) -> Self {
        self.reorder(TestSortOrder::None)
    }

    /// Shuffle surviving units
    #[must_use]
    pub fn reorder_randomly(self) -> Self {
        self.reorder(TestSortOrder::Random)
    }

    /// Set the reorder mode
    #[must_use]
    pub fn reorder(mut self, reorder: TestSortOrder) -> Self {
        self.options.reorder = reorder;
        self
    }

    /// Set the reporting level
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.options.log_level = level;
        self
    }

    /// Set how many optimized builds a snapshot survives
    #[must_use]
    pub fn max_compiles_before_stale_snapshot(mut self, max: usize) -> Self {
        self.options.max_compiles_before_stale_snapshot = max;
        self
    }

    /// Set the noun used when reporting units
    #[must_use]
    pub fn optimizable_name(mut self, name: impl Into<String>) -> Self {
        self.options.optimizable_name = name.into();
        self
    }

    /// Set the snapshot location
    #[must_use]
    pub fn snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.snapshot_file = Some(path.into());
        self
    }

    /// Set the registry manifest location
    #[must_use]
    pub fn registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.registry_file = Some(path.into());
        self
    }

    /// Use `init` as the registry and `<init>.snapshot` as the snapshot
    #[must_use]
    pub fn snapshot_and_registry_from(self, init: impl AsRef<Path>) -> Self {
        let init = init.as_ref();
        self.registry(init).snapshot(snapshot_file_for(init))
    }

    /// Fix the shuffle seed
    #[must_use]
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.options.shuffle_seed = Some(seed);
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> OptimizationOptions {
        self.options
    }
}

/// Settings for the sampling per-test coverage index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Byte budget of the in-memory per-test bitset cache
    pub cache_capacity_bytes: usize,
    /// Expected number of per-test recordings; pre-sizes the cache table
    pub expected_recordings: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 64 * 1024 * 1024,
            expected_recordings: 1024,
        }
    }
}

impl SamplingConfig {
    /// Set the cache byte budget
    #[must_use]
    pub const fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    /// Set the expected number of recordings
    #[must_use]
    pub const fn with_expected_recordings(mut self, count: usize) -> Self {
        self.expected_recordings = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = OptimizationOptions::default();
        assert!(options.enabled);
        assert!(options.minimize);
        assert!(options.is_reorder_failfast());
        assert_eq!(options.max_compiles_before_stale_snapshot, 10);
        assert_eq!(options.optimizable_name, "test");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = OptimizationOptions::builder()
            .dont_reorder()
            .minimize(false)
            .log_level(LogLevel::Debug)
            .snapshot_and_registry_from("/work/cov.db")
            .build();
        assert!(!options.is_reordering());
        assert!(!options.minimize);
        assert!(options.log_level.is_debug());
        assert_eq!(options.registry_file, Some(PathBuf::from("/work/cov.db")));
        assert_eq!(options.snapshot_file, Some(PathBuf::from("/work/cov.db.snapshot")));
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let options = OptimizationOptions::from_yaml_str("reorder: random\nshuffle_seed: 7\n").unwrap();
        assert!(options.is_reorder_randomly());
        assert_eq!(options.shuffle_seed, Some(7));
        assert!(options.enabled);
    }

    #[test]
    fn test_json_options() {
        let options =
            OptimizationOptions::from_json_str(r#"{"enabled": false, "log_level": "quiet"}"#).unwrap();
        assert!(!options.enabled);
        assert_eq!(options.log_level, LogLevel::Quiet);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = OptimizationOptions::from_yaml_str("max_compiles_before_stale_snapshot: 0").unwrap_err();
        assert!(matches!(err, SiftError::InvalidConfig { .. }));
        assert!(OptimizationOptions::from_yaml_str("reorder: sideways").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opts.json");
        fs::write(&path, r#"{"minimize": false}"#).unwrap();
        assert!(!OptimizationOptions::load(&path).unwrap().minimize);
    }

    #[test]
    fn test_log_level_directives() {
        assert_eq!(LogLevel::Quiet.filter_directive(), "warn");
        assert!(LogLevel::Verbose.is_verbose());
        assert!(!LogLevel::Info.is_verbose());
    }

    #[test]
    fn test_sampling_config_builder() {
        let config = SamplingConfig::default()
            .with_cache_capacity(1024)
            .with_expected_recordings(3);
        assert_eq!(config.cache_capacity_bytes, 1024);
        assert_eq!(config.expected_recordings, 3);
    }
}
