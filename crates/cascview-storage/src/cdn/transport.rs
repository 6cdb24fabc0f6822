//! HTTP transport for CDN requests

use std::ops::Range;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{ETAG, RANGE};
use tracing::trace;

use crate::{Result, StorageError};

/// Body and validation data of one CDN response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdnResponse {
    /// Response body
    pub data: Vec<u8>,
    /// ETag header with quotes removed
    pub etag: Option<String>,
}

/// Fetches CDN URLs
///
/// A 404 must surface as [`StorageError::NotFound`] so callers can try the
/// next host or fall back without treating it as a transport failure.
pub trait CdnTransport: Send + Sync {
    /// GET `url`, restricted to `range` when given
    fn fetch(&self, url: &str, range: Option<Range<u64>>) -> Result<CdnResponse>;
}

/// Blocking HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        // Install ring crypto provider for rustls (idempotent)
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .https_only(false)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("cascview/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl CdnTransport for HttpTransport {
    fn fetch(&self, url: &str, range: Option<Range<u64>>) -> Result<CdnResponse> {
        let mut request = self.client.get(url);
        if let Some(range) = &range {
            request = request.header(
                RANGE,
                format!("bytes={}-{}", range.start, range.end.saturating_sub(1)),
            );
        }

        let response = request.send().map_err(|e| map_error(url, &e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Http(format!("{url}: HTTP {status}")));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let data = response.bytes().map_err(|e| map_error(url, &e))?.to_vec();
        trace!("GET {} -> {} bytes", url, data.len());

        Ok(CdnResponse { data, etag })
    }
}

fn map_error(url: &str, error: &reqwest::Error) -> StorageError {
    if error.is_timeout() {
        StorageError::Timeout(url.to_string())
    } else {
        StorageError::Http(format!("{url}: {error}"))
    }
}
