//! Runtime configuration for the retrieval pipeline.
//!
//! The core consumes configuration as plain values: endpoint URLs,
//! parallelism, and the per-request timeout. Parsing those values out of
//! flags or the environment is the binary's job.

use std::time::Duration;

use url::Url;

/// Default public index endpoint.
pub const DEFAULT_INDEX_URL: &str = "https://index.golang.org/index";

/// Default public content proxy endpoint.
pub const DEFAULT_PROXY_URL: &str = "https://proxy.golang.org";

/// Default number of concurrent enrichment slots.
pub const DEFAULT_PARALLELISM: usize = 100;

/// Default per-request timeout applied to all outbound calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout applied to all outbound calls.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Values consumed by the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Index endpoint serving newline-delimited records.
    pub index_url: Url,
    /// Proxy endpoint serving version lists, manifests, and archives.
    pub proxy_url: Url,
    /// Concurrent enrichment slots and in-flight request cap.
    pub parallelism: usize,
    /// Timeout applied uniformly to every outbound request.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Builds the shared HTTP client used by the index and proxy clients.
    ///
    /// A single client is reused across all requests for connection
    /// pooling; the per-request timeout covers the whole response body.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the TLS backend cannot be
    /// initialized.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.request_timeout)
            .gzip(true)
            .build()
    }
}

impl Default for ClientConfig {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self {
            // The default endpoints are compile-time constants; parsing
            // them cannot fail.
            index_url: Url::parse(DEFAULT_INDEX_URL).expect("default index URL is valid"),
            proxy_url: Url::parse(DEFAULT_PROXY_URL).expect("default proxy URL is valid"),
            parallelism: DEFAULT_PARALLELISM,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ClientConfig::default();
        assert_eq!(config.index_url.as_str(), DEFAULT_INDEX_URL);
        // Url normalizes a bare origin with a trailing slash.
        assert_eq!(config.proxy_url.as_str(), "https://proxy.golang.org/");
        assert_eq!(config.parallelism, 100);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_http_client_builds() {
        let config = ClientConfig::default();
        assert!(config.http_client().is_ok());
    }
}
