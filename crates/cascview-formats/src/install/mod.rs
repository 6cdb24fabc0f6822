//! Install manifest
//!
//! ```text
//! "IN" | version u8 | ckey size u8 | tag count u16 BE | entry count u32 BE
//! tags:    name\0 | type u16 BE | mask (entry_count + 7) / 8 bytes
//! entries: name\0 | content key | size u32 BE
//! ```
//!
//! Tag masks are read as raw bits: entry `i` is bit `i % 8` of byte `i / 8`.

use binrw::BinRead;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;

use cascview_crypto::ContentKey;

use crate::cancel::{CancellationToken, Cancelled};
use crate::read_cstring;
use crate::tags::{BitOrder, Tag, TagReadError, read_tags};

/// Install manifest errors
#[derive(Debug, Error)]
pub enum InstallError {
    /// File did not start with "IN"
    #[error("invalid install manifest magic: expected 'IN', got {0:02X?}")]
    InvalidMagic([u8; 2]),

    /// Content key size other than 16
    #[error("unsupported install manifest key size {0}")]
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

impl From<TagReadError> for InstallError {
    fn from(err: TagReadError) -> Self {
        match err {
            TagReadError::Io(e) => Self::Io(e),
            TagReadError::Cancelled(e) => Self::Cancelled(e),
        }
    }
}

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct InstallHeader {
    magic: [u8; 2],
    version: u8,
    ckey_size: u8,
    tag_count: u16,
    entry_count: u32,
}

/// A file listed in the install manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    /// Path relative to the installation root
    pub name: String,
    /// MD5 of the decoded file
    pub content_key: ContentKey,
    /// Decoded size
    pub size: u32,
}

/// Parsed install manifest
#[derive(Debug, Clone, Default)]
pub struct InstallManifest {
    /// Manifest version
    pub version: u8,
    /// Files in manifest order
    pub entries: Vec<InstallEntry>,
    /// Tags with one bit per entry
    pub tags: Vec<Tag>,
}

impl InstallManifest {
    /// Parse a decoded install manifest
    pub fn parse(data: &[u8]) -> Result<Self, InstallError> {
        Self::parse_with(data, &CancellationToken::new())
    }

    /// Parse, checking `cancel` between records
    pub fn parse_with(data: &[u8], cancel: &CancellationToken) -> Result<Self, InstallError> {
        let mut reader = Cursor::new(data);
        let header = InstallHeader::read(&mut reader)?;
        if header.magic != *b"IN" {
            return Err(InstallError::InvalidMagic(header.magic));
        }
        if header.ckey_size != 16 {
            return Err(InstallError::UnsupportedKeySize(header.ckey_size));
        }

        let entry_count = header.entry_count as usize;
        let tags = read_tags(
            &mut reader,
            usize::from(header.tag_count),
            entry_count.div_ceil(8),
            BitOrder::Raw,
            cancel,
        )?;

        let mut entries = Vec::with_capacity(entry_count.min(data.len() / 21));
        for _ in 0..entry_count {
            cancel.check()?;
            let name = read_cstring(&mut reader)?;
            let content_key = ContentKey::read_le(&mut reader)?;
            let mut size = [0u8; 4];
            reader.read_exact(&mut size)?;
            entries.push(InstallEntry {
                name,
                content_key,
                size: u32::from_be_bytes(size),
            });
        }

        debug!(
            "install manifest v{}: {} entries, {} tags",
            header.version,
            entries.len(),
            tags.len()
        );
        Ok(Self {
            version: header.version,
            entries,
            tags,
        })
    }

    /// Tag with the given name, case-insensitive
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Entries carrying the tag `name`; empty for an unknown tag
    pub fn entries_for_tag(&self, name: &str) -> Vec<&InstallEntry> {
        self.tag(name).map_or_else(Vec::new, |tag| {
            tag.indices(self.entries.len())
                .map(|i| &self.entries[i])
                .collect()
        })
    }

    /// Entries carrying every tag in `names`
    pub fn entries_for_tags(&self, names: &[&str]) -> Vec<&InstallEntry> {
        let tags: Option<Vec<&Tag>> = names.iter().map(|n| self.tag(n)).collect();
        let Some(tags) = tags else {
            return Vec::new();
        };
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| tags.iter().all(|t| t.contains(*i)))
            .map(|(_, e)| e)
            .collect()
    }
}
