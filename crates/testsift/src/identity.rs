//! Test identities and per-run test outcomes.
//!
//! A [`TestIdentity`] is the stable key used to recognise the same test
//! method across runs. It can be reached under several names (its source
//! path, its runtime class name and its fully qualified method names), and
//! the snapshot indexes it under every one of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable key for a test method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestIdentity {
    /// Type that declares the test method, e.g. `com.foo.BaseTest`
    source_type_name: String,
    /// Type the method was invoked on, e.g. `com.foo.BarTest`
    runtime_type_name: String,
    /// Method name, e.g. `testParse`
    method_name: String,
    /// Package-relative source path of the declaring type, e.g. `com/foo/BaseTest.java`
    package_path: String,
    /// True when the method was declared on a base type of the runtime type
    inherited: bool,
}

impl TestIdentity {
    /// Create an identity; the call is inherited when the declaring and
    /// runtime types differ
    #[must_use]
    pub fn new(
        source_type_name: impl Into<String>,
        runtime_type_name: impl Into<String>,
        method_name: impl Into<String>,
        package_path: impl Into<String>,
    ) -> Self {
        let source_type_name = source_type_name.into();
        let runtime_type_name = runtime_type_name.into();
        let inherited = source_type_name != runtime_type_name;
        Self {
            source_type_name,
            runtime_type_name,
            method_name: method_name.into(),
            package_path: package_path.into(),
            inherited,
        }
    }

    /// Identity for a method declared and invoked on the same type
    #[must_use]
    pub fn declared(
        type_name: impl Into<String>,
        method_name: impl Into<String>,
        package_path: impl Into<String>,
    ) -> Self {
        let type_name = type_name.into();
        Self::new(type_name.clone(), type_name, method_name, package_path)
    }

    /// Declaring type name
    #[must_use]
    pub fn source_type_name(&self) -> &str {
        &self.source_type_name
    }

    /// Runtime type name
    #[must_use]
    pub fn runtime_type_name(&self) -> &str {
        &self.runtime_type_name
    }

    /// Method name
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Package-relative source path
    #[must_use]
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Whether the method was inherited from a base type
    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    /// `DeclaringType.method`
    #[must_use]
    pub fn source_method_name(&self) -> String {
        format!("{}.{}", self.source_type_name, self.method_name)
    }

    /// `RuntimeType.method`
    #[must_use]
    pub fn runtime_method_name(&self) -> String {
        format!("{}.{}", self.runtime_type_name, self.method_name)
    }

    /// Every name under which this test is indexed for lookup
    #[must_use]
    pub fn lookup_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(4);
        names.push(self.source_method_name());
        if self.inherited {
            names.push(self.runtime_method_name());
        }
        names.push(self.package_path.clone());
        names.push(self.runtime_type_name.clone());
        names
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.runtime_type_name, self.method_name)?;
        if self.inherited {
            write!(f, " (declared in {})", self.source_type_name)?;
        }
        Ok(())
    }
}

/// How a test run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The harness recorded no result for the test
    #[default]
    NoResult,
    /// The test passed
    Passed,
    /// The test failed an assertion
    Failed,
    /// The test terminated with an unexpected error
    Abnormal,
}

impl ExitStatus {
    /// Wire code used by recording transcripts
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NoResult => -1,
            Self::Passed => 0,
            Self::Abnormal => 1,
            Self::Failed => 2,
        }
    }

    /// Decode a wire code
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::NoResult),
            0 => Some(Self::Passed),
            1 => Some(Self::Abnormal),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    /// True only for a recorded pass; a missing result counts as not passed
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Passed)
    }

    /// True when the transcript carries a message and stack trace
    #[must_use]
    pub const fn carries_error_info(self) -> bool {
        matches!(self, Self::Failed | Self::Abnormal)
    }
}

/// Outcome of one test in one run, as read from its recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test identity
    pub test: TestIdentity,
    /// Start time (ms since epoch)
    pub start_ms: i64,
    /// End time (ms since epoch)
    pub end_ms: i64,
    /// Exit status
    pub status: ExitStatus,
}

impl TestOutcome {
    /// Create a new outcome
    #[must_use]
    pub fn new(test: TestIdentity, start_ms: i64, end_ms: i64, status: ExitStatus) -> Self {
        Self {
            test,
            start_ms,
            end_ms,
            status,
        }
    }

    /// Wall-clock duration of the test; 0 when the clock ran backwards
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms.saturating_sub(self.start_ms).max(0)
    }

    /// Whether the test passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_declared_is_not_inherited() {
        let t = TestIdentity::declared("com.foo.BarTest", "testA", "com/foo/BarTest.java");
        assert!(!t.is_inherited());
        assert_eq!(
            t.lookup_names(),
            vec![
                "com.foo.BarTest.testA".to_string(),
                "com/foo/BarTest.java".to_string(),
                "com.foo.BarTest".to_string(),
            ]
        );
    }

    #[test]
    fn test_inherited_adds_runtime_method_name() {
        let t = TestIdentity::new(
            "com.foo.BaseTest",
            "com.foo.BarTest",
            "testA",
            "com/foo/BaseTest.java",
        );
        assert!(t.is_inherited());
        let names = t.lookup_names();
        assert!(names.contains(&"com.foo.BaseTest.testA".to_string()));
        assert!(names.contains(&"com.foo.BarTest.testA".to_string()));
        assert!(names.contains(&"com.foo.BarTest".to_string()));
        assert_eq!(names.len(), 4);
        assert_eq!(t.to_string(), "com.foo.BarTest.testA (declared in com.foo.BaseTest)");
    }

    #[test]
    fn test_identity_hash_eq() {
        let mut set = HashSet::new();
        set.insert(TestIdentity::declared("A", "m", "A.java"));
        set.insert(TestIdentity::declared("A", "m", "A.java"));
        set.insert(TestIdentity::declared("A", "n", "A.java"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_exit_status_codes() {
        for status in [
            ExitStatus::NoResult,
            ExitStatus::Passed,
            ExitStatus::Failed,
            ExitStatus::Abnormal,
        ] {
            assert_eq!(ExitStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ExitStatus::from_code(42), None);
        assert!(!ExitStatus::NoResult.is_success());
        assert!(ExitStatus::Abnormal.carries_error_info());
    }

    #[test]
    fn test_outcome_duration() {
        let o = TestOutcome::new(
            TestIdentity::declared("A", "m", "A.java"),
            1_000,
            1_250,
            ExitStatus::Passed,
        );
        assert_eq!(o.duration_ms(), 250);
        assert!(o.is_success());
    }

    #[test]
    fn test_outcome_duration_never_negative_or_overflowing() {
        let id = TestIdentity::declared("A", "m", "A.java");
        let skewed = TestOutcome::new(id.clone(), 2_000, 1_500, ExitStatus::Passed);
        assert_eq!(skewed.duration_ms(), 0);
        let extreme = TestOutcome::new(id, i64::MIN + 5, 1_700_000_000_000, ExitStatus::Passed);
        assert_eq!(extreme.duration_ms(), i64::MAX);
    }
}
