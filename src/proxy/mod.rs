//! Client for the content proxy endpoints.
//!
//! The proxy serves three things per module: a plain-text version list
//! (`/@v/list`), a manifest per version (`/@v/<version>.mod`), and a
//! source archive per version (`/@v/<version>.zip`). Any of them may
//! report a version permanently removed with HTTP 410; that tombstone
//! is a normal outcome, distinct from errors, and callers must handle
//! it without treating it as a failure.

mod error;

pub use error::ProxyError;

use futures_util::StreamExt;
use reqwest::Client;
use tracing::instrument;
use url::Url;

/// Outcome of a proxy fetch: a payload, or a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    /// The proxy served the requested content.
    Body(T),
    /// The proxy reported the content permanently gone (HTTP 410).
    Gone,
}

impl<T> Fetched<T> {
    /// Maps the payload, preserving a tombstone.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Self::Body(value) => Fetched::Body(f(value)),
            Self::Gone => Fetched::Gone,
        }
    }
}

/// Client for the version-list, manifest, and archive endpoints.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: Client,
    base: String,
}

impl ProxyClient {
    /// Creates a proxy client over a shared HTTP client.
    #[must_use]
    pub fn new(http: Client, proxy_url: Url) -> Self {
        let base = proxy_url.as_str().trim_end_matches('/').to_string();
        Self { http, base }
    }

    /// Downloads the whitespace-delimited version list for `module`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] on network failures and non-2xx, non-410
    /// statuses.
    #[instrument(skip(self))]
    pub async fn list_versions(&self, module: &str) -> Result<Fetched<Vec<String>>, ProxyError> {
        let url = self.endpoint(module, "list");
        Ok(self.get_bytes(&url).await?.map(|body| {
            String::from_utf8_lossy(&body)
                .split_whitespace()
                .map(str::to_string)
                .collect()
        }))
    }

    /// Downloads the manifest for `module` at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] on network failures and non-2xx, non-410
    /// statuses.
    #[instrument(skip(self))]
    pub async fn manifest(
        &self,
        module: &str,
        version: &str,
    ) -> Result<Fetched<String>, ProxyError> {
        let url = self.endpoint(module, &format!("{version}.mod"));
        Ok(self
            .get_bytes(&url)
            .await?
            .map(|body| String::from_utf8_lossy(&body).into_owned()))
    }

    /// Streams the source archive for `module` at `version` into `buf`.
    ///
    /// The buffer is appended to, not replaced; callers hand in a pooled
    /// buffer they have already cleared. Archives can run to tens of MB,
    /// so the body is streamed chunk by chunk instead of collected.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] on network failures and non-2xx, non-410
    /// statuses. On error the buffer contents are unspecified.
    #[instrument(skip(self, buf))]
    pub async fn archive(
        &self,
        module: &str,
        version: &str,
        buf: &mut Vec<u8>,
    ) -> Result<Fetched<()>, ProxyError> {
        let url = self.endpoint(module, &format!("{version}.zip"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProxyError::from_request(&url, e))?;

        match response.status().as_u16() {
            410 => return Ok(Fetched::Gone),
            status if !response.status().is_success() => {
                return Err(ProxyError::status(&url, status));
            }
            _ => {}
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProxyError::from_request(&url, e))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(Fetched::Body(()))
    }

    /// Fetches a URL, mapping 410 to a tombstone and other non-2xx to errors.
    async fn get_bytes(&self, url: &str) -> Result<Fetched<Vec<u8>>, ProxyError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProxyError::from_request(url, e))?;

        match response.status().as_u16() {
            410 => Ok(Fetched::Gone),
            status if !response.status().is_success() => Err(ProxyError::status(url, status)),
            _ => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ProxyError::from_request(url, e))?;
                Ok(Fetched::Body(body.to_vec()))
            }
        }
    }

    /// Builds `<base>/<module>/@v/<suffix>`.
    fn endpoint(&self, module: &str, suffix: &str) -> String {
        format!("{}/{}/@v/{}", self.base, module, suffix)
    }
}
