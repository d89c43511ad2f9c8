//! Checkpointed cursor pagination over the remote index.
//!
//! The index serves newline-delimited JSON records in pages, with the
//! `since` query parameter as a timestamp cursor. There is no explicit
//! end-of-stream marker: a page shorter than the server's page size is
//! the only termination signal. A successful full pass is persisted as
//! a checkpoint so a re-run skips the network entirely.

mod checkpoint;
mod error;

pub use error::IndexError;

use std::path::Path;

use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use crate::corpus::IndexRecord;

/// Maximum records per index page.
///
/// This tracks the server's documented page size. Pagination stops on
/// the first page shorter than this, so if the server constant ever
/// changes this one must change with it or the crawl truncates.
pub const INDEX_PAGE_SIZE: usize = 2000;

/// Client for the append-only index endpoint.
#[derive(Debug, Clone)]
pub struct IndexClient {
    http: Client,
    index_url: Url,
}

impl IndexClient {
    /// Creates an index client over a shared HTTP client.
    #[must_use]
    pub fn new(http: Client, index_url: Url) -> Self {
        Self { http, index_url }
    }

    /// Returns the full record set, from the checkpoint when possible.
    ///
    /// A valid checkpoint short-circuits the network pass entirely; this
    /// is a cold-start optimization, not live resume — a run that
    /// paginates always starts from an empty cursor. After a successful
    /// pass the accumulated records are persisted atomically before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on any network, status, decode, or
    /// checkpoint-write failure. No partial checkpoint is written.
    #[instrument(skip(self), fields(index_url = %self.index_url))]
    pub async fn fetch(&self, checkpoint_path: &Path) -> Result<Vec<IndexRecord>, IndexError> {
        if let Some(records) = checkpoint::load(checkpoint_path) {
            info!(
                records = records.len(),
                path = %checkpoint_path.display(),
                "using existing index checkpoint"
            );
            return Ok(records);
        }

        let records = self.fetch_all().await?;
        checkpoint::store(checkpoint_path, &records)?;
        info!(records = records.len(), "index pass complete");
        Ok(records)
    }

    /// Paginates the index from an empty cursor to exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on the first failed page; records
    /// accumulated so far are discarded.
    pub async fn fetch_all(&self) -> Result<Vec<IndexRecord>, IndexError> {
        let mut records = Vec::new();
        let mut since: Option<String> = None;

        loop {
            let url = self.page_url(since.as_deref());
            let page = self.fetch_page(&url, &mut records, &mut since).await?;
            debug!(page, total = records.len(), "index page fetched");
            if page < INDEX_PAGE_SIZE {
                break;
            }
        }

        Ok(records)
    }

    /// Fetches one page, appending records and advancing the cursor.
    ///
    /// Returns the number of records the page contained.
    async fn fetch_page(
        &self,
        url: &Url,
        records: &mut Vec<IndexRecord>,
        since: &mut Option<String>,
    ) -> Result<usize, IndexError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IndexError::from_request(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::status(url.as_str(), status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IndexError::from_request(url.as_str(), e))?;

        let mut page = 0usize;
        for item in serde_json::Deserializer::from_slice(&body).into_iter::<IndexRecord>() {
            let record = item.map_err(|e| IndexError::decode(url.as_str(), e))?;
            *since = Some(record.timestamp.clone());
            records.push(record);
            page += 1;
        }
        Ok(page)
    }

    /// Builds the page URL, adding the `since` cursor when present.
    fn page_url(&self, since: Option<&str>) -> Url {
        let mut url = self.index_url.clone();
        if let Some(ts) = since {
            url.query_pairs_mut().append_pair("since", ts);
        }
        url
    }
}
