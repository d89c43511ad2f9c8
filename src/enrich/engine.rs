//! Bounded fan-out/fan-in enrichment scheduler.
//!
//! The engine takes the corpus seeded from the index and enriches one
//! module per task: version discovery through the proxy list endpoint,
//! then a capped per-version fan-out fetching manifests (and optionally
//! source archives for tokenizing). Results and per-item errors flow
//! through separate channels into two collector tasks; an item failure
//! never aborts the run.
//!
//! # Concurrency Model
//!
//! - Each module runs in its own Tokio task, gated by a slot semaphore
//!   so at most `parallelism` modules are in flight (RAII permits).
//! - A second semaphore caps in-flight outbound requests at
//!   `parallelism` across all tasks, including the per-version
//!   sub-fan-out, so nested fan-out never multiplies the request load.
//! - Per module, at most [`VERSION_FANOUT_LIMIT`] version tasks run at
//!   once, bounding task count for modules with thousands of versions.
//! - Result and error senders are cloned per task; the channels close
//!   when the last task finishes, which is what lets the collectors
//!   drain fully before the engine returns. Closing earlier would drop
//!   in-flight sends; returning before the collectors join would race
//!   the result maps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::progress::ProgressReporter;
use crate::content::{ContentError, ContentWorker};
use crate::corpus::{Corpus, ModuleVersion};
use crate::manifest::{self, ManifestError};
use crate::proxy::{Fetched, ProxyClient, ProxyError};

/// Minimum allowed parallelism value.
const MIN_PARALLELISM: usize = 1;

/// Maximum allowed parallelism value.
const MAX_PARALLELISM: usize = 512;

/// Cap on concurrently running version tasks within one module.
pub const VERSION_FANOUT_LIMIT: usize = 16;

/// Interval between progress snapshots.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(15);

/// Error type for engine construction and run-level failures.
///
/// Per-item enrichment failures are never surfaced here; they are
/// collected as [`EnrichError`] values instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid parallelism value provided.
    #[error(
        "invalid parallelism {value}: must be between {MIN_PARALLELISM} and {MAX_PARALLELISM}"
    )]
    InvalidParallelism {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Slot semaphore was closed unexpectedly.
    #[error("slot semaphore closed unexpectedly")]
    SlotsClosed,
}

/// One collected per-item enrichment failure.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Version-list fetch failed; the module is dropped from the result.
    #[error("list versions {module}: {source}")]
    ListVersions {
        /// Module whose list fetch failed.
        module: String,
        /// The underlying proxy error.
        #[source]
        source: ProxyError,
    },

    /// Manifest fetch failed; the version is dropped from the result.
    #[error("manifest fetch {module}@{version}: {source}")]
    ManifestFetch {
        /// Module whose manifest fetch failed.
        module: String,
        /// Version whose manifest fetch failed.
        version: String,
        /// The underlying proxy error.
        #[source]
        source: ProxyError,
    },

    /// Manifest bytes arrived but did not parse; the version is kept
    /// with its `manifest_error` field set.
    #[error("manifest parse {module}@{version}: {source}")]
    ManifestParse {
        /// Module whose manifest was malformed.
        module: String,
        /// Version whose manifest was malformed.
        version: String,
        /// The underlying parse error.
        #[source]
        source: ManifestError,
    },

    /// Archive fetch, decode, or stats persistence failed; the version
    /// is kept with whatever metadata was already assembled.
    #[error("content {module}@{version}: {source}")]
    Content {
        /// Module whose content step failed.
        module: String,
        /// Version whose content step failed.
        version: String,
        /// The underlying content error.
        #[source]
        source: ContentError,
    },
}

/// How a version task concluded, for the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Tombstoned,
    Errored,
}

/// Bounded-concurrency enrichment scheduler.
#[derive(Debug)]
pub struct EnrichEngine {
    proxy: Arc<ProxyClient>,
    content: Option<Arc<ContentWorker>>,
    parallelism: usize,
    slots: Arc<Semaphore>,
    requests: Arc<Semaphore>,
}

impl EnrichEngine {
    /// Creates an engine with the given parallelism.
    ///
    /// `content` enables the archive/tokenize step when present.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidParallelism`] if the value is
    /// outside the valid range.
    pub fn new(
        proxy: Arc<ProxyClient>,
        content: Option<Arc<ContentWorker>>,
        parallelism: usize,
    ) -> Result<Self, EngineError> {
        if !(MIN_PARALLELISM..=MAX_PARALLELISM).contains(&parallelism) {
            return Err(EngineError::InvalidParallelism { value: parallelism });
        }

        debug!(
            parallelism,
            content_enabled = content.is_some(),
            "creating enrichment engine"
        );

        Ok(Self {
            proxy,
            content,
            parallelism,
            slots: Arc::new(Semaphore::new(parallelism)),
            requests: Arc::new(Semaphore::new(parallelism)),
        })
    }

    /// Returns the configured parallelism.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Enriches every module in the seed corpus.
    ///
    /// Returns the enriched corpus and the collected per-item errors.
    /// A non-empty error list with a populated corpus is a normal
    /// partial-failure outcome; only run-level failures error out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SlotsClosed`] if the slot semaphore is
    /// closed while dispatching.
    #[instrument(skip(self, seed), fields(modules = seed.module_count()))]
    pub async fn enrich(&self, seed: Corpus) -> Result<(Corpus, Vec<EnrichError>), EngineError> {
        let progress = Arc::new(ProgressReporter::new(
            seed.module_count(),
            seed.version_count(),
        ));
        let (ticker, ticker_stop) = Arc::clone(&progress).spawn(PROGRESS_INTERVAL);

        let (result_tx, mut result_rx) =
            mpsc::channel::<(String, Vec<ModuleVersion>)>(self.parallelism);
        let (error_tx, mut error_rx) = mpsc::channel::<EnrichError>(self.parallelism);

        let result_collector = tokio::spawn(async move {
            let mut corpus = Corpus::default();
            while let Some((name, versions)) = result_rx.recv().await {
                corpus.insert_module(name, versions);
            }
            corpus
        });
        let error_collector = tokio::spawn(async move {
            let mut errors = Vec::new();
            while let Some(error) = error_rx.recv().await {
                errors.push(error);
            }
            errors
        });

        info!("starting enrichment");

        let mut handles = Vec::with_capacity(seed.module_count());
        for (name, versions) in seed.modules {
            // Blocks while all slots are busy; this loop is the producer.
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SlotsClosed)?;

            let task = ModuleTask {
                proxy: Arc::clone(&self.proxy),
                content: self.content.clone(),
                progress: Arc::clone(&progress),
                requests: Arc::clone(&self.requests),
                errors: error_tx.clone(),
            };
            let results = result_tx.clone();

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII).
                let _permit = permit;
                if let Some(enriched) = task.process_module(name.clone(), versions).await {
                    if results.send((name, enriched)).await.is_err() {
                        warn!("result collector gone, dropping module result");
                    }
                }
            }));
        }
        drop(result_tx);
        drop(error_tx);

        debug!(task_count = handles.len(), "waiting for module tasks");
        for handle in handles {
            // Task panics are logged but don't fail the run.
            if let Err(e) = handle.await {
                warn!(error = %e, "enrichment task panicked");
            }
        }

        // All sender clones are gone now, so both channels are closed
        // and the collectors drain to completion.
        let corpus = match result_collector.await {
            Ok(corpus) => corpus,
            Err(e) => {
                warn!(error = %e, "result collector panicked");
                Corpus::default()
            }
        };
        let errors = match error_collector.await {
            Ok(errors) => errors,
            Err(e) => {
                warn!(error = %e, "error collector panicked");
                Vec::new()
            }
        };

        ticker_stop.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = ticker.await;
        progress.log_snapshot();

        info!(
            modules = corpus.module_count(),
            versions = corpus.version_count(),
            errors = errors.len(),
            "enrichment complete"
        );

        Ok((corpus, errors))
    }
}

/// Per-module context cloned into each spawned task.
#[derive(Clone)]
struct ModuleTask {
    proxy: Arc<ProxyClient>,
    content: Option<Arc<ContentWorker>>,
    progress: Arc<ProgressReporter>,
    requests: Arc<Semaphore>,
    errors: mpsc::Sender<EnrichError>,
}

impl ModuleTask {
    /// Enriches one module; returns `None` when the module is dropped
    /// (its version list could not be fetched).
    async fn process_module(
        &self,
        name: String,
        seed: Vec<ModuleVersion>,
    ) -> Option<Vec<ModuleVersion>> {
        let mut versions: HashMap<String, ModuleVersion> = seed
            .into_iter()
            .map(|mv| (mv.version.clone(), mv))
            .collect();

        // Version discovery must finish before the manifest fan-out.
        let listed = {
            let _permit = self.request_permit().await;
            self.proxy.list_versions(&name).await
        };
        match listed {
            Ok(Fetched::Body(list)) => {
                for version in list {
                    versions
                        .entry(version.clone())
                        .or_insert_with(|| ModuleVersion::new(name.clone(), version));
                }
            }
            Ok(Fetched::Gone) => {
                // The whole module is tombstoned; keep the indexed
                // versions but mark them unavailable.
                for mv in versions.values_mut() {
                    mv.proxied = false;
                }
                self.progress.add_tombstoned(versions.len() as u64);
                return Some(versions.into_values().collect());
            }
            Err(source) => {
                self.progress.add_errored();
                self.report(EnrichError::ListVersions {
                    module: name,
                    source,
                })
                .await;
                return None;
            }
        }

        let fanout = Arc::new(Semaphore::new(VERSION_FANOUT_LIMIT));
        let mut tasks = JoinSet::new();
        for (_, mv) in versions {
            // Acquire before spawning so a module with thousands of
            // versions never holds more than the cap in live tasks.
            // The fan-out semaphore is never closed; acquire cannot
            // fail in practice.
            let slot = fanout.clone().acquire_owned().await.ok();
            let task = self.clone();
            tasks.spawn(async move {
                let _slot = slot;
                task.enrich_version(mv).await
            });
        }

        let mut enriched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(mv)) => enriched.push(mv),
                Ok(None) => {}
                Err(e) => warn!(module = %name, error = %e, "version task panicked"),
            }
        }
        Some(enriched)
    }

    /// Enriches one version; returns `None` when the version is dropped
    /// (its manifest could not be fetched).
    async fn enrich_version(&self, mut mv: ModuleVersion) -> Option<ModuleVersion> {
        let mut outcome = Outcome::Completed;

        let fetched = {
            let _permit = self.request_permit().await;
            self.proxy.manifest(&mv.name, &mv.version).await
        };
        match fetched {
            Ok(Fetched::Body(text)) => match manifest::parse_manifest(&text) {
                Ok(parsed) => {
                    mv.language_version = parsed.language_version;
                    mv.requires = parsed.requires;
                    mv.excludes = parsed.excludes;
                    mv.replaces = parsed.replaces;
                }
                Err(source) => {
                    mv.manifest_error = Some(source.to_string());
                    outcome = Outcome::Errored;
                    self.report(EnrichError::ManifestParse {
                        module: mv.name.clone(),
                        version: mv.version.clone(),
                        source,
                    })
                    .await;
                }
            },
            Ok(Fetched::Gone) => {
                // Keep the record: the tombstone itself is the data.
                mv.proxied = false;
                self.progress.add_tombstoned(1);
                return Some(mv);
            }
            Err(source) => {
                self.progress.add_errored();
                self.report(EnrichError::ManifestFetch {
                    module: mv.name.clone(),
                    version: mv.version.clone(),
                    source,
                })
                .await;
                return None;
            }
        }

        if let Some(content) = &self.content {
            let fetched = {
                let _permit = self.request_permit().await;
                content.fetch_and_tokenize(&mv.name, &mv.version).await
            };
            match fetched {
                Ok(Fetched::Body(stats)) => {
                    mv.token_freq = stats.token_freq;
                    mv.ident_freq = stats.ident_freq;
                }
                Ok(Fetched::Gone) => {
                    mv.proxied = false;
                    if outcome == Outcome::Completed {
                        outcome = Outcome::Tombstoned;
                    }
                }
                Err(source) => {
                    if outcome == Outcome::Completed {
                        outcome = Outcome::Errored;
                    }
                    self.report(EnrichError::Content {
                        module: mv.name.clone(),
                        version: mv.version.clone(),
                        source,
                    })
                    .await;
                }
            }

            if let Err(source) = content.persist(&mv).await {
                if outcome == Outcome::Completed {
                    outcome = Outcome::Errored;
                }
                self.report(EnrichError::Content {
                    module: mv.name.clone(),
                    version: mv.version.clone(),
                    source,
                })
                .await;
            }
        }

        match outcome {
            Outcome::Completed => self.progress.add_completed(),
            Outcome::Tombstoned => self.progress.add_tombstoned(1),
            Outcome::Errored => self.progress.add_errored(),
        }
        Some(mv)
    }

    /// Acquires a slot on the global in-flight request gate.
    async fn request_permit(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        // The request semaphore is never closed; acquire cannot fail in
        // practice.
        self.requests.clone().acquire_owned().await.ok()
    }

    /// Sends one error to the collector; best-effort.
    async fn report(&self, error: EnrichError) {
        if self.errors.send(error).await.is_err() {
            warn!("error collector gone, dropping enrichment error");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use url::Url;

    fn test_proxy() -> Arc<ProxyClient> {
        Arc::new(ProxyClient::new(
            reqwest::Client::new(),
            Url::parse("http://proxy.test").unwrap(),
        ))
    }

    #[test]
    fn test_engine_new_valid_parallelism() {
        let engine = EnrichEngine::new(test_proxy(), None, 1).unwrap();
        assert_eq!(engine.parallelism(), 1);

        let engine = EnrichEngine::new(test_proxy(), None, 100).unwrap();
        assert_eq!(engine.parallelism(), 100);

        let engine = EnrichEngine::new(test_proxy(), None, 512).unwrap();
        assert_eq!(engine.parallelism(), 512);
    }

    #[test]
    fn test_engine_new_invalid_parallelism_zero() {
        let result = EnrichEngine::new(test_proxy(), None, 0);
        assert!(matches!(
            result,
            Err(EngineError::InvalidParallelism { value: 0 })
        ));
    }

    #[test]
    fn test_engine_new_invalid_parallelism_too_high() {
        let result = EnrichEngine::new(test_proxy(), None, 513);
        assert!(matches!(
            result,
            Err(EngineError::InvalidParallelism { value: 513 })
        ));
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidParallelism { value: 0 };
        let msg = error.to_string();
        assert!(msg.contains("invalid parallelism"));
        assert!(msg.contains('0'));
    }

    #[test]
    fn test_enrich_error_display_carries_coordinate() {
        let error = EnrichError::ManifestFetch {
            module: "example.com/a".to_string(),
            version: "v1.0.0".to_string(),
            source: ProxyError::status("http://proxy.test/example.com/a/@v/v1.0.0.mod", 500),
        };
        let msg = error.to_string();
        assert!(msg.contains("example.com/a@v1.0.0"), "coordinate in: {msg}");
        assert!(msg.contains("500"), "status in: {msg}");
    }

    #[tokio::test]
    async fn test_enrich_empty_corpus() {
        let engine = EnrichEngine::new(test_proxy(), None, 4).unwrap();
        let (corpus, errors) = engine.enrich(Corpus::default()).await.unwrap();
        assert_eq!(corpus.module_count(), 0);
        assert!(errors.is_empty());
    }
}
