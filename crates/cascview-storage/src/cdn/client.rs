//! CDN client with host fallback and optional disk cache

use std::fmt;
use std::ops::Range;

use tracing::{debug, warn};

use cascview_crypto::EncodingKey;

use super::cache::CdnCache;
use super::transport::{CdnResponse, CdnTransport};
use crate::{Result, StorageError};

/// Top-level CDN directory of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `config/`
    Config,
    /// `data/`
    Data,
}

impl ContentKind {
    const fn dir(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Data => "data",
        }
    }
}

/// CDN client for one product
pub struct CdnClient {
    hosts: Vec<String>,
    path: String,
    transport: Box<dyn CdnTransport>,
    cache: Option<CdnCache>,
}

impl fmt::Debug for CdnClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnClient")
            .field("hosts", &self.hosts)
            .field("path", &self.path)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl CdnClient {
    /// Client for `hosts` serving objects under `path`
    pub fn new(hosts: Vec<String>, path: impl Into<String>, transport: Box<dyn CdnTransport>) -> Self {
        Self {
            hosts,
            path: path.into().trim_matches('/').to_string(),
            transport,
            cache: None,
        }
    }

    /// Mirror downloads in `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: CdnCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Hosts in try order
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Path relative to a host, e.g. `data/ab/cd/abcd...index`
    ///
    /// Fails unless `key_hex` is at least four hex digits.
    pub fn relative_path(kind: ContentKind, key_hex: &str, suffix: &str) -> Result<String> {
        if key_hex.len() < 4 || !key_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StorageError::Config(format!("invalid key {key_hex:?}")));
        }
        let hex = key_hex.to_ascii_lowercase();
        Ok(format!(
            "{}/{}/{}/{hex}{suffix}",
            kind.dir(),
            &hex[0..2],
            &hex[2..4]
        ))
    }

    /// Full URL of an object on `host`
    pub fn url(&self, host: &str, relative: &str) -> String {
        let host = host.trim_end_matches('/');
        if host.contains("://") {
            format!("{host}/{}/{relative}", self.path)
        } else {
            format!("http://{host}/{}/{relative}", self.path)
        }
    }

    /// Build or CDN config text
    pub fn fetch_config(&self, key_hex: &str) -> Result<Vec<u8>> {
        self.fetch(&Self::relative_path(ContentKind::Config, key_hex, "")?, None)
    }

    /// Index of the archive `archive`
    pub fn fetch_index(&self, archive: &EncodingKey) -> Result<Vec<u8>> {
        self.fetch(
            &Self::relative_path(ContentKind::Data, &archive.to_hex(), ".index")?,
            None,
        )
    }

    /// A loose blob stored under its own encoding key
    pub fn fetch_data(&self, key: &EncodingKey) -> Result<Vec<u8>> {
        self.fetch(&Self::relative_path(ContentKind::Data, &key.to_hex(), "")?, None)
    }

    /// `size` bytes at `offset` inside the archive `archive`
    pub fn fetch_range(&self, archive: &EncodingKey, offset: u64, size: u64) -> Result<Vec<u8>> {
        let relative = Self::relative_path(ContentKind::Data, &archive.to_hex(), "")?;
        let data = self.fetch(&relative, Some(offset..offset + size))?;
        if data.len() as u64 != size {
            return Err(StorageError::Cdn(format!(
                "{relative}: expected {size} bytes at {offset}, got {}",
                data.len()
            )));
        }
        Ok(data)
    }

    fn fetch(&self, relative: &str, range: Option<Range<u64>>) -> Result<Vec<u8>> {
        // Ranges are cached as their own objects
        let cache_key = range.as_ref().map_or_else(
            || relative.to_string(),
            |r| format!("{relative}.{}-{}", r.start, r.end),
        );
        if let Some(data) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            return Ok(data);
        }

        let CdnResponse { data, etag } = self.fetch_from_hosts(relative, range.clone())?;

        if let Some(cache) = &self.cache {
            let etag = if range.is_some() { None } else { etag.as_deref() };
            if let Err(e) = cache.put(&cache_key, &data, etag) {
                warn!("Failed to cache {relative}: {e}");
            }
        }
        Ok(data)
    }

    fn fetch_from_hosts(&self, relative: &str, range: Option<Range<u64>>) -> Result<CdnResponse> {
        if self.hosts.is_empty() {
            return Err(StorageError::Cdn(format!("no CDN hosts configured for {relative}")));
        }

        let mut all_missing = true;
        let mut last_error = None;
        for host in &self.hosts {
            let url = self.url(host, relative);
            match self.transport.fetch(&url, range.clone()) {
                Ok(response) => {
                    debug!("Fetched {} ({} bytes)", url, response.data.len());
                    return Ok(response);
                }
                Err(e) => {
                    debug!("CDN host {host} failed for {relative}: {e}");
                    all_missing &= e.is_not_found();
                    last_error = Some(e);
                }
            }
        }

        if all_missing {
            return Err(StorageError::NotFound(relative.to_string()));
        }
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(StorageError::Cdn(format!(
            "all {} hosts failed for {relative}: {reason}",
            self.hosts.len()
        )))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct StubTransport {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl CdnTransport for StubTransport {
        fn fetch(&self, url: &str, range: Option<Range<u64>>) -> Result<CdnResponse> {
            self.requests.lock().push(url.to_string());
            let objects = self.objects.lock();
            let data = objects
                .get(url)
                .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
            let data = match range {
                Some(r) => data[r.start as usize..r.end as usize].to_vec(),
                None => data.clone(),
            };
            Ok(CdnResponse { data, etag: None })
        }
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            CdnClient::relative_path(ContentKind::Data, "ABCDEF0123", ".index").unwrap(),
            "data/ab/cd/abcdef0123.index"
        );
        assert_eq!(
            CdnClient::relative_path(ContentKind::Config, "0011", "").unwrap(),
            "config/00/11/0011"
        );
    }

    #[test]
    fn test_relative_path_rejects_non_hex_keys() {
        for key in ["../../etc/passwd", "ab", "\u{e9}\u{e9}cd", "0011/..", ""] {
            assert!(
                matches!(
                    CdnClient::relative_path(ContentKind::Config, key, ""),
                    Err(StorageError::Config(_))
                ),
                "{key:?}"
            );
        }
    }

    #[test]
    fn test_fetch_config_with_bad_key_never_hits_transport() {
        let stub = StubTransport::default();
        let client = CdnClient::new(vec!["cdn.test".to_string()], "tpr/wow", Box::new(stub.clone()));
        assert!(client.fetch_config("../secret").is_err());
        assert!(stub.requests.lock().is_empty());
    }

    #[test]
    fn test_host_fallback() {
        let stub = StubTransport::default();
        stub.objects.lock().insert(
            "http://second.example.com/tpr/wow/config/aa/bb/aabb".to_string(),
            b"config".to_vec(),
        );
        let client = CdnClient::new(
            vec!["first.example.com".to_string(), "second.example.com".to_string()],
            "/tpr/wow/",
            Box::new(stub.clone()),
        );
        assert_eq!(client.fetch_config("AABB").unwrap(), b"config");
        assert_eq!(stub.requests.lock().len(), 2);
    }

    #[test]
    fn test_all_hosts_missing() {
        let client = CdnClient::new(
            vec!["a.example.com".to_string()],
            "tpr/wow",
            Box::new(StubTransport::default()),
        );
        assert!(matches!(
            client.fetch_config("aabb"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_range_and_cache() {
        let stub = StubTransport::default();
        let archive = EncodingKey::from_bytes([0xAB; 16]);
        stub.objects.lock().insert(
            format!("http://cdn.example.com/tpr/wow/data/ab/ab/{}", archive.to_hex()),
            b"0123456789".to_vec(),
        );
        let dir = tempfile::tempdir().unwrap();
        let client = CdnClient::new(
            vec!["cdn.example.com".to_string()],
            "tpr/wow",
            Box::new(stub.clone()),
        )
        .with_cache(CdnCache::new(dir.path()));

        assert_eq!(client.fetch_range(&archive, 2, 3).unwrap(), b"234");
        assert_eq!(client.fetch_range(&archive, 2, 3).unwrap(), b"234");
        assert_eq!(stub.requests.lock().len(), 1);
    }

    #[test]
    fn test_scheme_in_host() {
        let client = CdnClient::new(
            vec![],
            "tpr/wow",
            Box::new(StubTransport::default()),
        );
        assert_eq!(
            client.url("https://cdn.example.com/", "config/00/11/0011"),
            "https://cdn.example.com/tpr/wow/config/00/11/0011"
        );
        assert!(matches!(
            client.fetch_config("0011"),
            Err(StorageError::Cdn(_))
        ));
    }
}
