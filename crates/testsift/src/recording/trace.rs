//! Stack-trace filtering for failed test transcripts.
//!
//! Frames that belong to the test framework or to reflective dispatch add
//! nothing to a failure report, so they are dropped before the trace is
//! stored. A frame line looks like `at com.foo.Bar.baz(Bar.java:12)`; the
//! filter matches the fully qualified method between the first space and
//! the opening parenthesis.

use regex::Regex;

/// Method-name prefixes dropped by [`TraceFilter::default`]
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &[
    "junit.framework.",
    "org.junit.",
    "sun.reflect.",
    "java.lang.reflect.Method.invoke",
    "jdk.internal.reflect.",
];

/// Removes framework frames from stack traces
#[derive(Debug, Clone)]
pub struct TraceFilter {
    frame: Regex,
    ignored_prefixes: Vec<String>,
}

impl TraceFilter {
    /// Filter dropping frames whose method starts with any of `prefixes`
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frame: Regex::new(r"^\s*\S+\s+([^\s(]+)\(").expect("valid frame pattern"),
            ignored_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn is_ignored(&self, line: &str) -> bool {
        self.frame.captures(line).is_some_and(|caps| {
            let method = &caps[1];
            self.ignored_prefixes
                .iter()
                .any(|prefix| method.starts_with(prefix.as_str()))
        })
    }

    /// Filter a trace; returns it unchanged when `enabled` is false
    #[must_use]
    pub fn apply(&self, trace: &str, enabled: bool) -> String {
        if !enabled {
            return trace.to_string();
        }
        let mut out = String::with_capacity(trace.len());
        for line in trace.lines().filter(|line| !self.is_ignored(line)) {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_PREFIXES.iter().copied())
    }
}
