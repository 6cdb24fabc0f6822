//! Download manifest
//!
//! ```text
//! "DL" | version u8 | ekey size u8 | has checksum u8 | entry count u32 BE | tag count u16 BE
//! v2+: flag size u8
//! v3+: base priority i8 | 3 reserved bytes
//! entries: ekey | size u40 BE | priority i8 | [checksum u32 BE] | [flags]
//! tags:    name\0 | type u16 BE | mask (entry_count + 7) / 8 bytes
//! ```
//!
//! Mask bytes go through a fixed byte permutation before use.

use binrw::BinRead;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;

use cascview_crypto::EncodingKey;

use crate::cancel::{CancellationToken, Cancelled};
use crate::read_u40_be;
use crate::tags::{BitOrder, Tag, TagReadError, read_tags};

/// Download manifest errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// File did not start with "DL"
    #[error("invalid download manifest magic: expected 'DL', got {0:02X?}")]
    InvalidMagic([u8; 2]),

    /// Version outside 1..=3
    #[error("unsupported download manifest version {0}")]
    UnsupportedVersion(u8),

    /// Encoding key size other than 16
    #[error("unsupported download manifest key size {0}")]
    UnsupportedKeySize(u8),

    /// Parse stopped by a cancellation token
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl From<TagReadError> for DownloadError {
    fn from(err: TagReadError) -> Self {
        match err {
            TagReadError::Io(e) => Self::Io(e),
            TagReadError::Cancelled(e) => Self::Cancelled(e),
        }
    }
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct DownloadHeader {
    magic: [u8; 2],
    version: u8,
    ekey_size: u8,
    has_checksum: u8,
    entry_count: u32,
    tag_count: u16,
    #[br(if(version >= 2))]
    flag_size: u8,
    #[br(if(version >= 3))]
    base_priority: i8,
    #[br(if(version >= 3))]
    _reserved: [u8; 3],
}

/// A blob listed in the download manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    /// Encoding key of the blob
    pub encoding_key: EncodingKey,
    /// Encoded size
    pub size: u64,
    /// Download priority, lower first
    pub priority: i8,
    /// Optional checksum
    pub checksum: Option<u32>,
    /// Raw flag bytes (v2+)
    pub flags: Vec<u8>,
}

/// Parsed download manifest
#[derive(Debug, Clone, Default)]
pub struct DownloadManifest {
    /// Manifest version
    pub version: u8,
    /// Priority added to every entry (v3+)
    pub base_priority: i8,
    /// Blobs in manifest order
    pub entries: Vec<DownloadEntry>,
    /// Tags with one bit per entry
    pub tags: Vec<Tag>,
}

impl DownloadManifest {
    /// Parse a decoded download manifest
    pub fn parse(data: &[u8]) -> Result<Self, DownloadError> {
        Self::parse_with(data, &CancellationToken::new())
    }

    /// Parse, checking `cancel` between records
    pub fn parse_with(data: &[u8], cancel: &CancellationToken) -> Result<Self, DownloadError> {
        let mut reader = Cursor::new(data);
        let header = DownloadHeader::read(&mut reader)?;
        if header.magic != *b"DL" {
            return Err(DownloadError::InvalidMagic(header.magic));
        }
        if !(1..=3).contains(&header.version) {
            return Err(DownloadError::UnsupportedVersion(header.version));
        }
        if header.ekey_size != 16 {
            return Err(DownloadError::UnsupportedKeySize(header.ekey_size));
        }

        let entry_count = header.entry_count as usize;
        let mut entries = Vec::with_capacity(entry_count.min(data.len() / 22));
        for _ in 0..entry_count {
            cancel.check()?;
            let encoding_key = EncodingKey::read_le(&mut reader)?;
            let size = read_u40_be(&mut reader)?;
            let priority = i8::read_be(&mut reader)?;
            let checksum = if header.has_checksum != 0 {
                Some(u32::read_be(&mut reader)?)
            } else {
                None
            };
            let mut flags = vec![0u8; usize::from(header.flag_size)];
            reader.read_exact(&mut flags)?;
            entries.push(DownloadEntry {
                encoding_key,
                size,
                priority,
                checksum,
                flags,
            });
        }

        let tags = read_tags(
            &mut reader,
            usize::from(header.tag_count),
            entry_count.div_ceil(8),
            BitOrder::Permuted,
            cancel,
        )?;

        debug!(
            "download manifest v{}: {} entries, {} tags",
            header.version,
            entries.len(),
            tags.len()
        );
        Ok(Self {
            version: header.version,
            base_priority: header.base_priority,
            entries,
            tags,
        })
    }

    /// Tag with the given name, case-insensitive
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Entries carrying the tag `name`; empty for an unknown tag
    pub fn entries_for_tag(&self, name: &str) -> Vec<&DownloadEntry> {
        self.tag(name).map_or_else(Vec::new, |tag| {
            tag.indices(self.entries.len())
                .map(|i| &self.entries[i])
                .collect()
        })
    }
}
