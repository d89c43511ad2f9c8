//! Atomic persistence for the index checkpoint.
//!
//! The checkpoint is the full set of index records from one successful
//! pagination pass, serialized as JSON. Writes go through a sibling temp
//! file and a rename so a crashed run never leaves a truncated
//! checkpoint behind; a partial pass is never persisted at all.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::IndexError;
use crate::corpus::IndexRecord;

/// Loads and deserializes an existing checkpoint.
///
/// Returns `None` when the file is missing or does not deserialize; a
/// stale or corrupt checkpoint is not an error, it just forces a fresh
/// network pass.
#[must_use]
pub fn load(path: &Path) -> Option<Vec<IndexRecord>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable checkpoint");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(records) => Some(records),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "checkpoint did not deserialize");
            None
        }
    }
}

/// Serializes `records` and writes them to `path` atomically.
///
/// # Errors
///
/// Returns [`IndexError::Checkpoint`] if the temp file cannot be written
/// or the rename fails.
pub fn store(path: &Path, records: &[IndexRecord]) -> Result<(), IndexError> {
    let bytes = serde_json::to_vec(records)
        .map_err(|e| IndexError::checkpoint(path, std::io::Error::other(e)))?;

    let tmp = temp_path(path);
    std::fs::write(&tmp, &bytes).map_err(|e| IndexError::checkpoint(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| IndexError::checkpoint(path, e))?;

    debug!(path = %path.display(), records = records.len(), "checkpoint written");
    Ok(())
}

/// Sibling temp path: `<path>.tmp`, same directory so the rename stays
/// on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn record(path: &str, version: &str, timestamp: &str) -> IndexRecord {
        IndexRecord {
            path: path.to_string(),
            version: version.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn test_round_trip_preserves_record_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let records = vec![
            record("example.com/a", "v1.0.0", "t1"),
            record("example.com/b", "v0.1.0", "t2"),
            record("example.com/a", "v1.1.0", "t3"),
        ];

        store(&path, &records).unwrap();
        let loaded = load(&path).unwrap();

        // Order-independent set equality.
        let as_set = |records: &[IndexRecord]| -> HashSet<(String, String, String)> {
            records
                .iter()
                .map(|r| (r.path.clone(), r.version.clone(), r.timestamp.clone()))
                .collect()
        };
        assert_eq!(as_set(&records), as_set(&loaded));
        assert_eq!(records.len(), loaded.len());
    }

    #[test]
    fn test_load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn test_load_corrupt_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn test_store_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        store(&path, &[record("example.com/a", "v1.0.0", "t1")]).unwrap();

        assert!(path.exists());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_store_overwrites_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        store(&path, &[record("example.com/a", "v1.0.0", "t1")]).unwrap();
        store(&path, &[record("example.com/b", "v2.0.0", "t2")]).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, "example.com/b");
    }
}
