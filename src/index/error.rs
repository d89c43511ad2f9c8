//! Error types for the index fetcher.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while paginating the index or persisting the checkpoint.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching index page {url}: {source}")]
    Network {
        /// The page URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before the page was fully received.
    #[error("timeout fetching index page {url}")]
    Timeout {
        /// The page URL that timed out.
        url: String,
    },

    /// The index returned a non-success status.
    #[error("HTTP {status} fetching index page {url}")]
    Status {
        /// The page URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A record in the page body failed to decode.
    #[error("decoding index page {url}: {source}")]
    Decode {
        /// The page URL whose body was malformed.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing the checkpoint file failed.
    #[error("checkpoint {path}: {source}", path = .path.display())]
    Checkpoint {
        /// The checkpoint path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    /// Creates a status error.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates a checkpoint IO error.
    pub fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Checkpoint {
            path: path.into(),
            source,
        }
    }

    /// Maps a request error, distinguishing timeouts from other failures.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let error = IndexError::status("http://index.test/index", 502);
        let msg = error.to_string();
        assert!(msg.contains("502"), "Expected status in: {msg}");
        assert!(msg.contains("http://index.test/index"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_checkpoint_error_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = IndexError::checkpoint("/tmp/index.json", io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/index.json"), "Expected path in: {msg}");
    }
}
