//! Source registry collaborator.
//!
//! The registry owns the slot address space and knows the current content
//! fingerprint of every source file. testsift only reads it: the optimizer
//! asks "what does this file look like now", the snapshot and the sampling
//! index walk its files.

use crate::coverage::SlotRange;
use crate::result::{SiftError, SiftResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Content fingerprint of a source file
///
/// Two fingerprints are equal only if both checksum and size match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFingerprint {
    /// Content checksum
    pub checksum: u64,
    /// Content size in bytes
    pub size: u64,
}

impl SourceFingerprint {
    /// Create a fingerprint
    #[must_use]
    pub const fn new(checksum: u64, size: u64) -> Self {
        Self { checksum, size }
    }

    /// Fingerprint raw content: first 8 bytes of its SHA-256, little-endian
    #[must_use]
    pub fn of_content(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self {
            checksum: u64::from_le_bytes(head),
            size: content.len() as u64,
        }
    }

    /// Fingerprint a file on disk
    pub fn of_file(path: &Path) -> SiftResult<Self> {
        Ok(Self::of_content(&fs::read(path)?))
    }

    /// True when `current` differs from this recorded fingerprint
    #[must_use]
    pub fn changed_to(&self, current: &Self) -> bool {
        self != current
    }
}

impl fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "checksum={}, size={}", self.checksum, self.size)
    }
}

/// One source file as described by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Package-relative path, e.g. `com/foo/Bar.java`
    pub path: String,
    /// Current content fingerprint
    #[serde(flatten)]
    pub fingerprint: SourceFingerprint,
    /// Slots owned by this file
    pub range: SlotRange,
    /// Entry slot of every method declared in the file
    #[serde(default)]
    pub method_entries: Vec<u32>,
}

impl SourceFile {
    /// Create a file descriptor
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        fingerprint: SourceFingerprint,
        range: SlotRange,
        method_entries: Vec<u32>,
    ) -> Self {
        Self {
            path: path.into(),
            fingerprint,
            range,
            method_entries,
        }
    }
}

/// Read-only view of the current source state
pub trait SourceRegistry: fmt::Debug {
    /// Version stamp of the registry; one per instrumented build
    fn version(&self) -> u64;

    /// Total number of coverage slots
    fn data_length(&self) -> u32;

    /// Current fingerprint of a file, or `None` if the registry no longer knows it
    fn find_file(&self, path: &str) -> Option<SourceFingerprint>;

    /// Lazy sequence of every known file; each call starts afresh
    fn files(&self) -> Box<dyn Iterator<Item = &SourceFile> + '_>;
}

/// Registry backed by an in-memory manifest of files
///
/// Manifests are plain JSON or YAML documents:
///
/// ```yaml
/// version: 7
/// files:
///   - path: com/foo/Bar.java
///     checksum: 1234
///     size: 880
///     range: { start: 0, len: 40 }
///     method_entries: [0, 12, 30]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestRegistry {
    version: u64,
    files: Vec<SourceFile>,
    #[serde(skip)]
    by_path: HashMap<String, usize>,
}

impl ManifestRegistry {
    /// Build a registry from a version stamp and a list of files
    #[must_use]
    pub fn new(version: u64, files: Vec<SourceFile>) -> Self {
        let mut registry = Self {
            version,
            files,
            by_path: HashMap::new(),
        };
        registry.reindex();
        registry
    }

    fn reindex(&mut self) {
        self.by_path = self
            .files
            .iter()
            .enumerate()
            .map(|(idx, file)| (file.path.clone(), idx))
            .collect();
    }

    /// Parse a JSON manifest
    pub fn from_json_str(json: &str) -> SiftResult<Self> {
        let mut registry: Self = serde_json::from_str(json)?;
        registry.reindex();
        Ok(registry)
    }

    /// Parse a YAML manifest
    pub fn from_yaml_str(yaml: &str) -> SiftResult<Self> {
        let mut registry: Self = serde_yaml_ng::from_str(yaml)?;
        registry.reindex();
        Ok(registry)
    }

    /// Load a manifest, choosing the parser by file extension (YAML unless `.json`)
    pub fn from_file(path: &Path) -> SiftResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SiftError::RegistryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parsed = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        };
        parsed.map_err(|e| SiftError::RegistryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the manifest as JSON
    pub fn save_json(&self, path: &Path) -> SiftResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Replace or add a file
    pub fn upsert(&mut self, file: SourceFile) {
        if let Some(&idx) = self.by_path.get(&file.path) {
            self.files[idx] = file;
        } else {
            self.by_path.insert(file.path.clone(), self.files.len());
            self.files.push(file);
        }
    }

    /// Remove a file
    pub fn remove(&mut self, path: &str) -> Option<SourceFile> {
        let idx = self.by_path.remove(path)?;
        let removed = self.files.remove(idx);
        self.reindex();
        Some(removed)
    }

    /// Bump the version stamp, as a rebuild would
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl SourceRegistry for ManifestRegistry {
    fn version(&self) -> u64 {
        self.version
    }

    fn data_length(&self) -> u32 {
        self.files.iter().map(|f| f.range.end()).max().unwrap_or(0)
    }

    fn find_file(&self, path: &str) -> Option<SourceFingerprint> {
        self.by_path.get(path).map(|&idx| self.files[idx].fingerprint)
    }

    fn files(&self) -> Box<dyn Iterator<Item = &SourceFile> + '_> {
        Box::new(self.files.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ManifestRegistry {
        ManifestRegistry::new(
            3,
            vec![
                SourceFile::new(
                    "com/foo/Bar.java",
                    SourceFingerprint::new(10, 100),
                    SlotRange::new(0, 20),
                    vec![0, 8],
                ),
                SourceFile::new(
                    "com/foo/Baz.java",
                    SourceFingerprint::new(11, 50),
                    SlotRange::new(20, 10),
                    vec![20],
                ),
            ],
        )
    }

    #[test]
    fn test_fingerprint_equality_requires_both_fields() {
        let a = SourceFingerprint::new(10, 100);
        assert!(!a.changed_to(&SourceFingerprint::new(10, 100)));
        assert!(a.changed_to(&SourceFingerprint::new(11, 100)));
        assert!(a.changed_to(&SourceFingerprint::new(10, 101)));
    }

    #[test]
    fn test_fingerprint_of_content_is_stable() {
        let a = SourceFingerprint::of_content(b"class Foo {}");
        let b = SourceFingerprint::of_content(b"class Foo {}");
        let c = SourceFingerprint::of_content(b"class Foo { }");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.size, 12);
    }

    #[test]
    fn test_registry_lookup_and_length() {
        let reg = sample();
        assert_eq!(reg.version(), 3);
        assert_eq!(reg.data_length(), 30);
        assert_eq!(
            reg.find_file("com/foo/Baz.java"),
            Some(SourceFingerprint::new(11, 50))
        );
        assert_eq!(reg.find_file("nope.java"), None);
        assert_eq!(reg.files().count(), 2);
        // restartable
        assert_eq!(reg.files().count(), 2);
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut reg = sample();
        reg.upsert(SourceFile::new(
            "com/foo/Bar.java",
            SourceFingerprint::new(99, 100),
            SlotRange::new(0, 20),
            vec![0],
        ));
        assert_eq!(
            reg.find_file("com/foo/Bar.java"),
            Some(SourceFingerprint::new(99, 100))
        );
        assert!(reg.remove("com/foo/Bar.java").is_some());
        assert_eq!(reg.find_file("com/foo/Bar.java"), None);
        assert!(reg.find_file("com/foo/Baz.java").is_some());
    }

    #[test]
    fn test_yaml_manifest() {
        let yaml = r"
version: 7
files:
  - path: a/B.java
    checksum: 5
    size: 9
    range: { start: 0, len: 4 }
    method_entries: [0, 2]
";
        let reg = ManifestRegistry::from_yaml_str(yaml).unwrap();
        assert_eq!(reg.version(), 7);
        assert_eq!(reg.find_file("a/B.java"), Some(SourceFingerprint::new(5, 9)));
    }

    #[test]
    fn test_json_round_trip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        sample().save_json(&path).unwrap();
        let loaded = ManifestRegistry::from_file(&path).unwrap();
        assert_eq!(loaded.find_file("com/foo/Bar.java"), Some(SourceFingerprint::new(10, 100)));
    }

    #[test]
    fn test_missing_file_is_registry_error() {
        let err = ManifestRegistry::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, SiftError::RegistryLoad { .. }));
    }
}
