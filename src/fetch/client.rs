//! Streaming HTTP transfers to a local temp path.
//!
//! Thin wrapper over `reqwest` that knows the two transfer shapes providers
//! need: a full GET of a file, and a `Range` GET when an index sidecar gave
//! us the byte window of one GRIB message inside a larger file.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::FetchError;
use crate::plan::ByteRange;

/// Default connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout; forecast files are large, 5 minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client with fixed timeouts for artifact transfers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30 s connect, 5 min request).
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    /// Creates a client with explicit timeouts.
    ///
    /// Falls back to a default-configured client if the builder rejects the
    /// configuration, which only happens when the TLS backend cannot
    /// initialize.
    #[must_use]
    pub fn with_timeouts(connect: Duration, request: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Streams `url` into `dest`: the whole file when `ranges` is empty,
    /// otherwise each byte range in order, concatenated.
    ///
    /// Returns the number of bytes written. `dest` may be left partially
    /// written on error; the caller owns cleanup of its temp path.
    ///
    /// # Errors
    ///
    /// [`FetchError::HttpStatus`] on any non-success response,
    /// [`FetchError::Timeout`]/[`FetchError::Network`] on transport failure,
    /// [`FetchError::Io`] on filesystem failure.
    pub async fn fetch_to_path(
        &self,
        url: &str,
        ranges: &[ByteRange],
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let mut file = File::create(dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;

        let mut written: u64 = 0;
        if ranges.is_empty() {
            written += self.stream_request(url, None, &mut file, dest).await?;
        } else {
            for range in ranges {
                written += self
                    .stream_request(url, Some(range), &mut file, dest)
                    .await?;
            }
        }
        file.flush().await.map_err(|e| FetchError::io(dest, e))?;

        debug!(url, bytes = written, dest = %dest.display(), "transfer complete");
        Ok(written)
    }

    async fn stream_request(
        &self,
        url: &str,
        range: Option<&ByteRange>,
        file: &mut File,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.http_range_value());
        }
        let response = request.send().await.map_err(|e| map_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_transport(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    /// Fetches `url` as text (used by resolvers for listings and sidecars).
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::fetch_to_path`], minus the IO variants.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        response.text().await.map_err(|e| map_transport(url, e))
    }
}

fn map_transport(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn full_get_streams_body_to_dest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.grib2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.grib2.tmp");
        let client = HttpClient::new();
        let bytes = client
            .fetch_to_path(&format!("{}/data.grib2", server.uri()), &[], &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn range_get_sends_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.grib2"))
            .and(header("Range", "bytes=10-19"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8; 10]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("msg.tmp");
        let client = HttpClient::new();
        let ranges = [ByteRange::from_offset_length(10, 10)];
        let bytes = client
            .fetch_to_path(&format!("{}/data.grib2", server.uri()), &ranges, &dest)
            .await
            .unwrap();
        assert_eq!(bytes, 10);
    }

    #[tokio::test]
    async fn multiple_ranges_concatenate_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.grib2"))
            .and(header("Range", "bytes=0-3"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"head".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.grib2"))
            .and(header("Range", "bytes=100-103"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"tail".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("joined.tmp");
        let client = HttpClient::new();
        let ranges = [
            ByteRange::from_offset_length(0, 4),
            ByteRange::from_offset_length(100, 4),
        ];
        let bytes = client
            .fetch_to_path(&format!("{}/data.grib2", server.uri()), &ranges, &dest)
            .await
            .unwrap();
        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"headtail");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.tmp");
        let client = HttpClient::new();
        let err = client
            .fetch_to_path(&format!("{}/missing", server.uri()), &[], &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }
}
