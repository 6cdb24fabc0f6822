//! CDN archive `.index` files
//!
//! Each archive blob on the CDN has an index listing the encoding keys it
//! holds. Records are 24 bytes (`key[16] | size u32 BE | offset u32 BE`)
//! packed into 4 KiB blocks. Block tails are zero padded, and the file ends
//! with a footer whose record count sits as a little-endian `u32` twelve
//! bytes from the end.

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, trace};

use cascview_crypto::{EncodingKey, KeyMap};

use crate::cancel::{CancellationToken, Cancelled};

/// Size of one index record
pub const RECORD_SIZE: usize = 24;

/// Offset of the record count, measured back from the end of the file
pub const FOOTER_COUNT_OFFSET: usize = 12;

/// Archive index errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File too short to hold a footer
    #[error("archive index too small: {0} bytes")]
    TooSmall(usize),

    /// Footer claims more records than the file can hold
    #[error("archive index declares {count} records but is only {len} bytes")]
    CountTooLarge {
        /// Declared record count
        count: u32,
        /// File length
        len: usize,
    },

    /// Two zero keys in a row where a record was expected
    #[error("archive index record {record} has a zero key")]
    ZeroKey {
        /// Index of the record being read
        record: usize,
    },

    /// Parse stopped by a cancellation token
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of a blob inside a CDN archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Position of the archive in the CDN config's archive list
    pub archive_index: u16,
    /// Encoded size
    pub size: u32,
    /// Byte offset inside the archive
    pub offset: u32,
}

/// Records of one parsed `.index` file
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: Vec<(EncodingKey, ArchiveLocation)>,
}

impl ArchiveIndex {
    /// Parse an index for the archive at `archive_index`
    pub fn parse(data: &[u8], archive_index: u16) -> Result<Self, ArchiveError> {
        Self::parse_with(data, archive_index, &CancellationToken::new())
    }

    /// Parse, checking `cancel` between records
    pub fn parse_with(
        data: &[u8],
        archive_index: u16,
        cancel: &CancellationToken,
    ) -> Result<Self, ArchiveError> {
        if data.len() < FOOTER_COUNT_OFFSET {
            return Err(ArchiveError::TooSmall(data.len()));
        }
        let at = data.len() - FOOTER_COUNT_OFFSET;
        let count = u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        if (count as usize).saturating_mul(RECORD_SIZE) > data.len() {
            return Err(ArchiveError::CountTooLarge {
                count,
                len: data.len(),
            });
        }

        let mut reader = Cursor::new(data);
        let mut entries = Vec::with_capacity(count as usize);
        for record in 0..count as usize {
            cancel.check()?;
            let mut key = [0u8; 16];
            reader.read_exact(&mut key)?;
            if key == [0u8; 16] {
                // Block padding; the record continues after it
                reader.read_exact(&mut key)?;
                if key == [0u8; 16] {
                    return Err(ArchiveError::ZeroKey { record });
                }
            }
            let mut fields = [0u8; 8];
            reader.read_exact(&mut fields)?;
            entries.push((
                EncodingKey::from_bytes(key),
                ArchiveLocation {
                    archive_index,
                    size: u32::from_be_bytes([fields[0], fields[1], fields[2], fields[3]]),
                    offset: u32::from_be_bytes([fields[4], fields[5], fields[6], fields[7]]),
                },
            ));
        }

        trace!("archive {}: {} records", archive_index, entries.len());
        Ok(Self { entries })
    }

    /// Records in file order
    pub fn entries(&self) -> &[(EncodingKey, ArchiveLocation)] {
        &self.entries
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merged lookup over every archive index of a build
///
/// When a key appears in several archives the first one merged wins.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndexTable {
    locations: KeyMap<EncodingKey, ArchiveLocation>,
    duplicates: usize,
}

impl ArchiveIndexTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the records of `index`
    pub fn merge(&mut self, index: ArchiveIndex) {
        for (key, location) in index.entries {
            if self.locations.contains_key(&key) {
                self.duplicates += 1;
                continue;
            }
            self.locations.insert(key, location);
        }
        debug!(
            "archive index table: {} keys, {} duplicates skipped",
            self.locations.len(),
            self.duplicates
        );
    }

    /// Location of `key`
    pub fn get(&self, key: &EncodingKey) -> Option<&ArchiveLocation> {
        self.locations.get(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no key has been merged
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.locations.clear();
        self.duplicates = 0;
    }
}
