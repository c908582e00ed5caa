//! Human and machine readable snapshot dumps.

use super::Snapshot;
use crate::result::SiftResult;
use serde::Serialize;
use std::io::{self, Write};
use tracing::debug;

#[derive(Debug, Serialize)]
struct JsonDump {
    project: JsonProject,
}

#[derive(Debug, Serialize)]
struct JsonProject {
    files: Vec<JsonFile>,
}

#[derive(Debug, Serialize)]
struct JsonFile {
    path: String,
    tests: Vec<JsonTest>,
}

#[derive(Debug, Serialize)]
struct JsonTest {
    name: String,
}

/// Renders a [`Snapshot`] as indented text or as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotPrinter;

impl SnapshotPrinter {
    /// Text dump: versions, known tests with durations, failing tests, covered files
    pub fn write_text<W: Write>(snapshot: &Snapshot, out: &mut W) -> io::Result<()> {
        match snapshot.location() {
            Some(path) => writeln!(out, "Snapshot at: {}", path.display())?,
            None => writeln!(out, "Snapshot at: <not stored>")?,
        }
        writeln!(out, "Snapshot version: {}", snapshot.tool_version())?;
        writeln!(out, "Running version: {}", super::TOOL_VERSION)?;

        writeln!(out, "Versions:")?;
        for version in snapshot.db_versions() {
            writeln!(out, "  {version}")?;
        }

        writeln!(out, "Known tests:")?;
        for (name, tests) in &snapshot.test_lookup {
            let duration = snapshot.duration_of(tests);
            writeln!(out, "  {name} : duration {}", format_duration(duration))?;
            for test in tests {
                writeln!(out, "    {test}")?;
            }
        }

        writeln!(out, "Failing tests:")?;
        for path in snapshot.failing_test_paths() {
            writeln!(out, "  {path}")?;
        }

        writeln!(out, "All files:")?;
        for (path, tests) in snapshot.file_to_tests() {
            writeln!(out, "  {path}")?;
            writeln!(out, "  Hitting tests:")?;
            for test in tests {
                writeln!(out, "    {test}")?;
            }
        }
        Ok(())
    }

    /// Text dump as a string
    #[must_use]
    pub fn to_text(snapshot: &Snapshot) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = Self::write_text(snapshot, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Emit the text dump as one debug event
    pub fn log_debug(snapshot: &Snapshot) {
        debug!(target: "testsift::snapshot", "{}", Self::to_text(snapshot));
    }

    /// `{"project":{"files":[{"path":..,"tests":[{"name":..}]}]}}`
    pub fn to_json(snapshot: &Snapshot) -> SiftResult<String> {
        let files = snapshot
            .file_to_tests()
            .into_iter()
            .map(|(path, tests)| JsonFile {
                path,
                tests: tests
                    .iter()
                    .map(|test| JsonTest {
                        name: test.runtime_method_name(),
                    })
                    .collect(),
            })
            .collect();
        let dump = JsonDump {
            project: JsonProject { files },
        };
        Ok(serde_json::to_string(&dump)?)
    }

    /// Write the JSON dump followed by a newline
    pub fn write_json<W: Write>(snapshot: &Snapshot, out: &mut W) -> SiftResult<()> {
        writeln!(out, "{}", Self::to_json(snapshot)?)?;
        Ok(())
    }
}

/// `1.25 s (1250 ms)`
fn format_duration(ms: i64) -> String {
    format!("{:.2} s ({ms} ms)", ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(1250), "1.25 s (1250 ms)");
        assert_eq!(format_duration(0), "0.00 s (0 ms)");
    }

    #[test]
    fn test_empty_snapshot_dumps() {
        let snapshot = Snapshot::default();
        let text = SnapshotPrinter::to_text(&snapshot);
        assert!(text.contains("Snapshot at: <not stored>"));
        assert!(text.contains("Known tests:"));
        assert_eq!(
            SnapshotPrinter::to_json(&snapshot).unwrap(),
            r#"{"project":{"files":[]}}"#
        );
    }
}
