//! Error types for artifact transfer and verification.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching and committing one artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, TLS, broken stream).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before the body completed.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx/5xx, or a missing 206 on a range request).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Filesystem error while writing or committing the artifact.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Downloaded bytes are not structurally valid for the artifact's format.
    ///
    /// Treated exactly like a transient transfer error: the temp file is
    /// removed and the attempt is retried.
    #[error("verification failed for {path}: {reason}")]
    Verification {
        /// The temp path whose content failed the check.
        path: PathBuf,
        /// What the structural check found.
        reason: String,
    },
}

impl FetchError {
    /// Creates a network error with URL context.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a verification error.
    pub fn verification(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Verification {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// No blanket `From<reqwest::Error>`/`From<std::io::Error>`: every variant
// carries context (url or path) the source error does not have, so callers go
// through the helper constructors.
