//! CASC storage engine
//!
//! Opens a local game installation (or an online-only session against the
//! CDN) and resolves files through the CASC indirection chain:
//!
//! ```text
//! path ── Jenkins96 ──> root ──> content key ──> encoding ──> encoding key
//!      ──> local .idx / CDN .index ──> archive bytes ──> BLTE ──> file
//! ```
//!
//! # Storage Layout
//!
//! - `<root>/.build.info`: active build, CDN hosts and path
//! - `<root>/Data/config/xx/yy/<key>`: build and CDN configs
//! - `<root>/Data/data/*.idx`, `data.NNN`: local indices and archives
//! - `<root>/Data/indices/<archive>.index`: CDN archive indices
//!
//! # Example
//!
//! ```rust,no_run
//! use cascview_storage::{CascStorage, StorageConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = CascStorage::open(StorageConfig::new("/path/to/wow"))?;
//! let data = storage.open_by_name("Interface\\FrameXML\\UIParent.lua")?;
//! println!("{} bytes", data.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

use cascview_formats::archive::ArchiveError;
use cascview_formats::blte::BlteError;
use cascview_formats::config::ConfigError;
use cascview_formats::download::DownloadError;
use cascview_formats::encoding::EncodingError;
use cascview_formats::install::InstallError;
use cascview_formats::root::RootError;

// Local storage
pub mod archive;
pub mod index;

// CDN access and cache
pub mod cdn;

// Name resolution
pub mod listfile;
pub mod names;
pub mod root;
pub mod tree;

// Configuration
pub mod config;

// Load progress reporting
pub mod progress;

// Storage facade
mod storage;

pub use cdn::{CdnClient, CdnResponse, CdnTransport, HttpTransport};
pub use config::{MissingFilePolicy, StorageConfig};
pub use names::NameTable;
pub use progress::{LoadPhase, NoProgress, Progress};
pub use root::RootHandler;
pub use storage::{BuildSummary, CascStorage, StorageStats};
pub use tree::{CascFile, CascFolder};

pub use cascview_formats::CancellationToken;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local index file error.
    #[error("Index error: {0}")]
    Index(String),

    /// Local archive read error.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Content not found.
    #[error("Content not found: {0}")]
    NotFound(String),

    /// A file failed to parse.
    #[error("Invalid format in {file}: {reason}")]
    InvalidFormat {
        /// File or table that failed
        file: String,
        /// What was wrong
        reason: String,
    },

    /// Product or root variant this crate cannot read.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Every CDN host failed.
    #[error("CDN error: {0}")]
    Cdn(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation stopped by a cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// BLTE decode error.
    #[error("BLTE error: {0}")]
    Blte(#[from] BlteError),

    /// Encoding table error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Root table error.
    #[error("Root error: {0}")]
    Root(#[from] RootError),

    /// Install manifest error.
    #[error("Install manifest error: {0}")]
    Install(#[from] InstallError),

    /// Download manifest error.
    #[error("Download manifest error: {0}")]
    Download(#[from] DownloadError),

    /// CDN archive index error.
    #[error("Archive index error: {0}")]
    ArchiveIndex(#[from] ArchiveError),

    /// Build or CDN config error.
    #[error("Config file error: {0}")]
    ConfigFile(#[from] ConfigError),
}

impl From<cascview_formats::Cancelled> for StorageError {
    fn from(_: cascview_formats::Cancelled) -> Self {
        Self::Cancelled
    }
}

impl StorageError {
    /// Wrap a parse failure with the name of the file it came from
    pub fn invalid_format(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidFormat {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a cancellation token stopped the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Blte(BlteError::Cancelled(_))
                | Self::Encoding(EncodingError::Cancelled(_))
                | Self::Root(RootError::Cancelled(_))
                | Self::Install(InstallError::Cancelled(_))
                | Self::Download(DownloadError::Cancelled(_))
                | Self::ArchiveIndex(ArchiveError::Cancelled(_))
        )
    }

    /// Whether the error means the file is absent rather than broken
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
