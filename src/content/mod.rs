//! Per-version content worker: archive download, extraction, tokenizing.
//!
//! For one (module, version) coordinate the worker downloads the source
//! archive into a pooled buffer, walks the archive entries, tokenizes
//! the source files, and optionally persists the finished record as one
//! JSON file per coordinate.

mod pool;
mod scanner;

pub use pool::{BufferPool, PooledBuf};
pub use scanner::{TokenStats, scan, scan_into};

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::corpus::ModuleVersion;
use crate::proxy::{Fetched, ProxyClient, ProxyError};

/// Extension that marks an archive entry as source code.
const SOURCE_EXTENSION: &str = ".go";

/// Initial capacity for pooled archive/file buffers.
const BUF_INITIAL_CAPACITY: usize = 4 << 20;

/// Errors raised while fetching or decoding a version's source archive.
///
/// The affected coordinate is attached by the enrichment layer; these
/// variants only describe the failing step.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The archive download failed.
    #[error("archive fetch: {0}")]
    Fetch(#[from] ProxyError),

    /// The downloaded bytes were not a readable archive.
    #[error("archive decode: {0}")]
    Decode(#[from] zip::result::ZipError),

    /// An archive entry could not be read out.
    #[error("archive entry {name}: {source}")]
    Entry {
        /// Entry name inside the archive.
        name: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the per-version stats record failed.
    #[error("stats record {path}: {source}", path = .path.display())]
    Persist {
        /// Destination path of the record.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Downloads and tokenizes source archives, one version at a time.
#[derive(Debug)]
pub struct ContentWorker {
    proxy: Arc<ProxyClient>,
    pool: BufferPool,
    stats_dir: Option<PathBuf>,
}

impl ContentWorker {
    /// Creates a worker. When `stats_dir` is set, each enriched version
    /// is persisted there as one JSON record.
    #[must_use]
    pub fn new(proxy: Arc<ProxyClient>, stats_dir: Option<PathBuf>) -> Self {
        Self {
            proxy,
            pool: BufferPool::new(BUF_INITIAL_CAPACITY),
            stats_dir,
        }
    }

    /// Downloads the archive for a coordinate and tokenizes its source files.
    ///
    /// Entries that do not carry the source extension are skipped. All
    /// retained entries fold into one [`TokenStats`] for the version.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] on download failures (other than a 410
    /// tombstone, which surfaces as [`Fetched::Gone`]), malformed
    /// archives, and unreadable entries.
    #[instrument(skip(self))]
    pub async fn fetch_and_tokenize(
        &self,
        module: &str,
        version: &str,
    ) -> Result<Fetched<TokenStats>, ContentError> {
        let mut body = self.pool.acquire();
        match self.proxy.archive(module, version, &mut body).await? {
            Fetched::Gone => return Ok(Fetched::Gone),
            Fetched::Body(()) => {}
        }

        let mut archive = zip::ZipArchive::new(Cursor::new(&body[..]))?;

        let mut stats = TokenStats::default();
        let mut file_buf = self.pool.acquire();
        let mut scanned = 0usize;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if !entry.name().ends_with(SOURCE_EXTENSION) {
                continue;
            }
            let name = entry.name().to_string();
            file_buf.clear();
            entry
                .read_to_end(&mut file_buf)
                .map_err(|e| ContentError::Entry { name, source: e })?;
            scan_into(&file_buf, &mut stats);
            scanned += 1;
        }

        debug!(module, version, files = scanned, "archive tokenized");
        Ok(Fetched::Body(stats))
    }

    /// Persists one finished version record under the stats directory.
    ///
    /// A worker without a stats directory persists nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Persist`] if the record cannot be written.
    pub async fn persist(&self, record: &ModuleVersion) -> Result<(), ContentError> {
        let Some(dir) = &self.stats_dir else {
            return Ok(());
        };
        let path = dir.join(record.stats_file_name());
        let bytes = serde_json::to_vec(record).map_err(|e| ContentError::Persist {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ContentError::Persist {
                path: path.clone(),
                source: e,
            })?;
        debug!(path = %path.display(), "stats record written");
        Ok(())
    }
}
