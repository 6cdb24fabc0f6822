//! Configuration for the storage system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cascview_formats::root::{ContentFlags, LocaleFlags};

/// What `open_*` does when a file cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilePolicy {
    /// Return `StorageError::NotFound`
    #[default]
    Error,
    /// Return empty data
    Empty,
}

/// Configuration for the storage system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Installation root holding `.build.info` and `Data/`
    pub base_path: PathBuf,

    /// Read everything from the CDN instead of a local installation
    pub online: bool,

    /// Product code (e.g. "wow", "wow_classic")
    pub product: Option<String>,

    /// CDN hosts, overriding those in `.build.info`
    pub cdn_hosts: Vec<String>,

    /// CDN path (e.g. "tpr/wow"), overriding the one in `.build.info`
    pub cdn_path: Option<String>,

    /// Build config key for sessions without `.build.info`
    pub build_key: Option<String>,

    /// CDN config key for sessions without `.build.info`
    pub cdn_key: Option<String>,

    /// Directory mirroring CDN downloads
    pub cache_dir: Option<PathBuf>,

    /// Timeout for one CDN request
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,

    /// Locale selection as raw flags
    pub locale: u32,

    /// Content selection as raw flags
    pub content: u32,

    /// Behaviour for unresolvable files
    pub missing_files: MissingFilePolicy,

    /// Load the install manifest
    pub load_install: bool,

    /// Load the download manifest
    pub load_download: bool,

    /// Verify encoding page checksums
    pub verify_encoding_pages: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            online: false,
            product: None,
            cdn_hosts: Vec::new(),
            cdn_path: None,
            build_key: None,
            cdn_key: None,
            cache_dir: None,
            http_timeout: Duration::from_secs(30),
            locale: LocaleFlags::EN_US.0,
            content: ContentFlags::NONE.0,
            missing_files: MissingFilePolicy::Error,
            load_install: true,
            load_download: false,
            verify_encoding_pages: false,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration for the installation at `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Create an online-only configuration
    pub fn online(product: impl Into<String>) -> Self {
        Self {
            online: true,
            product: Some(product.into()),
            ..Default::default()
        }
    }

    /// Set the installation root
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.base_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the product code
    #[must_use]
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Set the CDN hosts and path
    #[must_use]
    pub fn with_cdn(mut self, hosts: Vec<String>, path: impl Into<String>) -> Self {
        self.cdn_hosts = hosts;
        self.cdn_path = Some(path.into());
        self
    }

    /// Set build and CDN config keys
    #[must_use]
    pub fn with_build(mut self, build_key: impl Into<String>, cdn_key: impl Into<String>) -> Self {
        self.build_key = Some(build_key.into());
        self.cdn_key = Some(cdn_key.into());
        self
    }

    /// Set the CDN cache directory
    #[must_use]
    pub fn with_cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the CDN request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the locale selection
    #[must_use]
    pub const fn with_locale(mut self, locale: LocaleFlags) -> Self {
        self.locale = locale.0;
        self
    }

    /// Set the content selection
    #[must_use]
    pub const fn with_content(mut self, content: ContentFlags) -> Self {
        self.content = content.0;
        self
    }

    /// Set the missing file policy
    #[must_use]
    pub const fn with_missing_files(mut self, policy: MissingFilePolicy) -> Self {
        self.missing_files = policy;
        self
    }

    /// Enable or disable the install and download manifests
    #[must_use]
    pub const fn with_manifests(mut self, install: bool, download: bool) -> Self {
        self.load_install = install;
        self.load_download = download;
        self
    }

    /// Enable or disable encoding page verification
    #[must_use]
    pub const fn with_page_verification(mut self, verify: bool) -> Self {
        self.verify_encoding_pages = verify;
        self
    }

    /// Locale selection
    pub const fn locale_flags(&self) -> LocaleFlags {
        LocaleFlags(self.locale)
    }

    /// Content selection
    pub const fn content_flags(&self) -> ContentFlags {
        ContentFlags(self.content)
    }

    /// `Data/` directory of the installation
    pub fn data_dir(&self) -> PathBuf {
        self.base_path.join("Data")
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
