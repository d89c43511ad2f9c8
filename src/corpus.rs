//! Corpus data model: index records, module versions, and the merged corpus.
//!
//! The corpus is a mapping from module name to the versions observed for
//! that module. It is seeded from raw index records and filled in by the
//! enrichment pass (version lists, manifests, optional token statistics).

use std::collections::HashMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One observation from the remote index.
///
/// Records are immutable once fetched. The `timestamp` field doubles as
/// the pagination cursor: within a page, timestamps are monotonically
/// non-decreasing, and the last timestamp of a page seeds the `since`
/// parameter of the next request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Module path as published in the index.
    #[serde(rename = "Path")]
    pub path: String,
    /// Version string for this observation.
    #[serde(rename = "Version")]
    pub version: String,
    /// Index timestamp, also used as the pagination cursor.
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

/// A (module, version) pair used for dependency edges and replacements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleCoordinate {
    /// Module path.
    pub module: String,
    /// Version string; empty when the directive carries no version.
    pub version: String,
}

impl ModuleCoordinate {
    /// Creates a coordinate from owned or borrowed parts.
    pub fn new(module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: version.into(),
        }
    }
}

/// A single requirement edge from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Required module path.
    pub module: String,
    /// Required version.
    pub version: String,
    /// Whether the requirement was marked indirect in the manifest.
    pub indirect: bool,
}

/// A replace directive from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceDirective {
    /// The coordinate being replaced.
    pub old: ModuleCoordinate,
    /// The replacement coordinate.
    pub new: ModuleCoordinate,
}

/// One version of one module, as assembled by the enrichment pass.
///
/// Exactly one worker ever mutates a given `ModuleVersion`; records are
/// finalized before they are handed to the result collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleVersion {
    /// Canonical module name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Index timestamp, when this version was seen in the index.
    /// Versions discovered only through the proxy list have none.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub indexed_at: Option<String>,
    /// Language version declared by the manifest, when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub language_version: Option<String>,
    /// Requirement edges from the manifest.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub requires: Vec<DependencyEdge>,
    /// Excluded coordinates from the manifest.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub excludes: Vec<ModuleCoordinate>,
    /// Replace directives from the manifest.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub replaces: Vec<ReplaceDirective>,
    /// False when the proxy reported the version permanently gone (410).
    pub proxied: bool,
    /// Token-kind frequency counts from the source archive.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub token_freq: HashMap<String, i64>,
    /// Identifier frequency counts from the source archive.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub ident_freq: HashMap<String, i64>,
    /// Manifest parse failure, recorded without dropping the version.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub manifest_error: Option<String>,
}

impl ModuleVersion {
    /// Creates an empty record for a version discovered through the proxy.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            proxied: true,
            ..Self::default()
        }
    }

    /// Creates a record seeded from an index observation.
    #[must_use]
    pub fn from_index(record: &IndexRecord) -> Self {
        Self {
            name: record.path.clone(),
            version: record.version.clone(),
            indexed_at: Some(record.timestamp.clone()),
            proxied: true,
            ..Self::default()
        }
    }

    /// Returns the (module, version) coordinate of this record.
    #[must_use]
    pub fn coordinate(&self) -> ModuleCoordinate {
        ModuleCoordinate::new(self.name.clone(), self.version.clone())
    }

    /// Deterministic, filesystem-safe name for the per-version stats record.
    ///
    /// Path separators in the module name are replaced so the full
    /// coordinate fits in a single file name.
    #[must_use]
    pub fn stats_file_name(&self) -> String {
        format!("{}@{}.json", self.name.replace('/', "--"), self.version)
    }
}

/// The consolidated corpus: module name to versions, keys unique.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    /// Versions per module, in discovery order.
    pub modules: HashMap<String, Vec<ModuleVersion>>,
}

impl Corpus {
    /// Seeds a corpus from raw index records.
    ///
    /// Records are grouped by module path; a (module, version) pair seen
    /// more than once in the index keeps only its first observation.
    #[must_use]
    pub fn from_index(records: &[IndexRecord]) -> Self {
        let mut modules: HashMap<String, Vec<ModuleVersion>> = HashMap::new();
        for record in records {
            let versions = modules.entry(record.path.clone()).or_default();
            if versions.iter().any(|mv| mv.version == record.version) {
                continue;
            }
            versions.push(ModuleVersion::from_index(record));
        }
        Self { modules }
    }

    /// Number of distinct modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Total number of versions across all modules.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    /// Inserts a module's final version list, replacing any existing entry.
    pub fn insert_module(&mut self, name: String, versions: Vec<ModuleVersion>) {
        self.modules.insert(name, versions);
    }

    /// Writes the whole corpus as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or serialization
    /// fails mid-write.
    pub fn write_json(&self, path: &Path) -> Result<(), io::Error> {
        let file = std::fs::File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        io::Write::flush(&mut writer)?;
        Ok(())
    }
}
