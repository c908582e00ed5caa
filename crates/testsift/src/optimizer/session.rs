//! Counters of a single optimization pass.

use crate::config::OptimizationOptions;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Accumulates what one or more optimize calls decided
///
/// Consumers read the counters for reporting; they never feed back into
/// decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationSession {
    optimizable_name: String,
    auto_summarize: bool,
    savings_ms: i64,
    total_time_ms: i64,
    original_count: usize,
    optimized_count: usize,
    found_count: usize,
    modified_paths: BTreeSet<String>,
    tried_to_optimize: bool,
}

impl OptimizationSession {
    /// Session that summarizes after every optimize call
    #[must_use]
    pub fn new(options: &OptimizationOptions) -> Self {
        Self {
            optimizable_name: options.optimizable_name.clone(),
            auto_summarize: true,
            ..Self::default()
        }
    }

    /// Whether [`summarize`](Self::summarize) runs after each optimize call
    #[must_use]
    pub fn with_auto_summarize(mut self, auto_summarize: bool) -> Self {
        self.auto_summarize = auto_summarize;
        self
    }

    pub(crate) fn add_total_time(&mut self, ms: i64) {
        self.total_time_ms = self.total_time_ms.saturating_add(ms);
    }

    pub(crate) fn add_savings(&mut self, ms: i64) {
        self.savings_ms = self.savings_ms.saturating_add(ms);
    }

    pub(crate) fn add_found(&mut self) {
        self.found_count += 1;
    }

    pub(crate) fn add_original(&mut self, count: usize) {
        self.original_count += count;
    }

    pub(crate) fn add_optimized(&mut self, count: usize) {
        self.optimized_count += count;
    }

    pub(crate) fn add_modified_path(&mut self, path: String) {
        self.modified_paths.insert(path);
    }

    pub(crate) fn after_optimization(&mut self, tried: bool) {
        self.tried_to_optimize |= tried;
        if self.auto_summarize {
            self.summarize();
        }
    }

    /// Estimated time saved by excluded units
    #[must_use]
    pub fn savings_ms(&self) -> i64 {
        self.savings_ms
    }

    /// Estimated time of every matched unit
    #[must_use]
    pub fn total_time_ms(&self) -> i64 {
        self.total_time_ms
    }

    /// Units offered to the optimizer
    #[must_use]
    pub fn original_count(&self) -> usize {
        self.original_count
    }

    /// Units returned by the optimizer
    #[must_use]
    pub fn optimized_count(&self) -> usize {
        self.optimized_count
    }

    /// Optional units matched with tests in the snapshot
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.found_count
    }

    /// Covered files found missing or changed
    #[must_use]
    pub fn modified_paths(&self) -> &BTreeSet<String> {
        &self.modified_paths
    }

    /// Whether any optimize call got past the preconditions
    #[must_use]
    pub fn tried_to_optimize(&self) -> bool {
        self.tried_to_optimize
    }

    /// Whether the session summarizes itself
    #[must_use]
    pub fn is_auto_summarize(&self) -> bool {
        self.auto_summarize
    }

    /// Log estimated savings and inclusion counts
    pub fn summarize(&self) {
        if self.savings_ms <= 0 {
            info!(
                "testsift {} unable to save any time on this optimized test run",
                if self.auto_summarize { "was" } else { "is" }
            );
        } else {
            info!(
                savings_ms = self.savings_ms,
                total_time_ms = self.total_time_ms,
                "testsift estimates {} around {} on this optimized test run. The full test run takes approx. {}",
                if self.auto_summarize { "having saved" } else { "saving" },
                sensible_duration(self.savings_ms),
                sensible_duration(self.total_time_ms)
            );
        }
        info!(
            included = self.optimized_count,
            total = self.original_count,
            "testsift {} {} test {} in this run",
            self.inclusion_verb(),
            self.optimized_count,
            pluralize(self.optimized_count, &self.optimizable_name)
        );
        debug!(
            found = self.found_count,
            total = self.original_count,
            "matched {} of {} test {} with the snapshot",
            self.found_count,
            self.original_count,
            pluralize(2, &self.optimizable_name)
        );
    }

    /// Summary text for callers that report on their own
    #[must_use]
    pub fn plain_summary(&self) -> String {
        let plural = pluralize(2, &self.optimizable_name);
        let mut out = format!(
            "testsift {} {} test {} in this run (total # test {}: {})\n",
            self.inclusion_verb(),
            self.optimized_count,
            pluralize(self.optimized_count, &self.optimizable_name),
            plural,
            self.original_count
        );
        if self.found_count < self.original_count {
            out.push_str(&format!(
                "testsift matched {} of your {} test {} with those registered during previous test runs.\n \
                 Unmatched {} may mean the build is not configured for test optimization.",
                self.found_count, self.original_count, plural, plural
            ));
        }
        out
    }

    fn inclusion_verb(&self) -> &'static str {
        if self.auto_summarize {
            "included"
        } else {
            "is including"
        }
    }
}

/// `word` in the plural unless `count` is 1
fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else if word.ends_with('s') || word.ends_with('x') {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Whole seconds, minutes or hours, rounded down, at least one second
fn sensible_duration(ms: i64) -> String {
    let seconds = ms.max(1000) / 1000;
    let (value, unit) = if seconds >= 3600 {
        (seconds / 3600, "hour")
    } else if seconds >= 60 {
        (seconds / 60, "minute")
    } else {
        (seconds, "second")
    };
    format!("{value} {}", pluralize(value as usize, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "test"), "test");
        assert_eq!(pluralize(3, "test"), "tests");
        assert_eq!(pluralize(0, "class"), "classes");
    }

    #[test]
    fn test_sensible_duration() {
        assert_eq!(sensible_duration(0), "1 second");
        assert_eq!(sensible_duration(59_000), "59 seconds");
        assert_eq!(sensible_duration(61_000), "1 minute");
        assert_eq!(sensible_duration(7_500_000), "2 hours");
    }

    #[test]
    fn test_plain_summary_mentions_unmatched() {
        let options = OptimizationOptions::builder().optimizable_name("class").build();
        let mut session = OptimizationSession::new(&options).with_auto_summarize(false);
        session.add_original(3);
        session.add_found();
        session.add_optimized(1);
        let summary = session.plain_summary();
        assert!(summary.starts_with("testsift is including 1 test class in this run (total # test classes: 3)"));
        assert!(summary.contains("matched 1 of your 3 test classes"));
    }

    #[test]
    fn test_after_optimization_is_sticky() {
        let mut session = OptimizationSession::new(&OptimizationOptions::default());
        session.after_optimization(true);
        session.after_optimization(false);
        assert!(session.tried_to_optimize());
    }
}
