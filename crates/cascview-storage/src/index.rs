//! Local index files (`Data/data/*.idx`)
//!
//! Each of the 16 buckets has one or more generations of index file named
//! `BBVVVVVVVV.idx` (bucket, version). Only the lexicographically last file
//! of a bucket is read.
//!
//! File layout:
//!
//! ```text
//! header block:  size u32 LE | hash u32 LE | header (size bytes)
//! padding to a 16-byte boundary
//! entry block:   size u32 LE | hash u32 LE | size / 18 records
//! ```
//!
//! Records are 18 bytes with mixed endianness:
//! - key: 9-byte truncated encoding key
//! - location: 1 byte archive high bits + 4 bytes BE (archive low 2 bits | 30-bit offset)
//! - size: 4 bytes **little-endian**, including the 30-byte local header

use binrw::{BinRead, BinReaderExt, BinResult, Endian};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info, warn};

use cascview_crypto::{EncodingKey, KeyMap, TruncatedKey};
use cascview_formats::CancellationToken;

use crate::{Result, StorageError};

/// Size of one index record
pub const INDEX_RECORD_SIZE: usize = 18;

/// Number of index buckets
pub const BUCKET_COUNT: u8 = 16;

/// Header stored inside the header block
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct IndexHeader {
    /// Index version (7 in current builds)
    pub version: u16,
    /// Bucket the file belongs to
    pub bucket: u8,
    /// Extra bytes, always 0
    pub extra_bytes: u8,
    /// Bytes of the size field (4)
    pub encoded_size_length: u8,
    /// Bytes of the location field (5)
    pub storage_offset_length: u8,
    /// Bytes of the key field (9)
    pub ekey_length: u8,
    /// Bits of the offset inside a location (30)
    pub file_offset_bits: u8,
}

/// Where an encoded blob lives in the local `data.NNN` files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Number of the `data.NNN` file
    pub archive_index: u16,
    /// Offset of the 30-byte local header
    pub offset: u32,
    /// Size including the local header
    pub size: u32,
}

fn parse_location<R: Read + Seek>(reader: &mut R, _endian: Endian, _args: ()) -> BinResult<(u16, u32)> {
    let high = u16::from(reader.read_be::<u8>()?);
    let low = reader.read_be::<u32>()?;
    let archive_index = (high << 2) | (low >> 30) as u16;
    Ok((archive_index, low & 0x3FFF_FFFF))
}

#[derive(Debug, Clone, BinRead)]
#[br(big)]
struct IndexRecord {
    key: [u8; 9],
    #[br(parse_with = parse_location)]
    location: (u16, u32),
    #[br(little)]
    size: u32,
}

/// Split an index file name into bucket and version
///
/// Names are ten hex digits followed by `.idx`: two for the bucket, eight
/// for the version.
pub fn parse_index_filename(name: &str) -> Option<(u8, u32)> {
    let stem = name.strip_suffix(".idx")?;
    if stem.len() != 10 || !stem.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let bucket = u8::from_str_radix(&stem[..2], 16).ok()?;
    let version = u32::from_str_radix(&stem[2..], 16).ok()?;
    (bucket < BUCKET_COUNT).then_some((bucket, version))
}

/// Merged lookup over every local index file
///
/// When the same truncated key appears twice the first record read wins.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: KeyMap<TruncatedKey, IndexEntry>,
    files: usize,
    duplicates: usize,
}

impl LocalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the newest index file of every bucket in `dir`
    pub fn load_dir(dir: &Path, cancel: &CancellationToken) -> Result<Self> {
        info!("Loading index files from {}", dir.display());

        let mut newest: BTreeMap<u8, String> = BTreeMap::new();
        for entry in fs::read_dir(dir)
            .map_err(|e| StorageError::Index(format!("failed to read {}: {e}", dir.display())))?
        {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_ascii_lowercase) else {
                continue;
            };
            if let Some((bucket, _)) = parse_index_filename(&name) {
                let slot = newest.entry(bucket).or_default();
                if name > *slot {
                    *slot = name;
                }
            }
        }

        if newest.is_empty() {
            return Err(StorageError::Index(format!(
                "no .idx files in {}",
                dir.display()
            )));
        }

        let mut index = Self::new();
        for (bucket, name) in &newest {
            cancel.check()?;
            let path = dir.join(name);
            debug!("Loading index bucket {:02x} from {}", bucket, path.display());
            let data = fs::read(&path)?;
            index
                .load_file(&data, cancel)
                .map_err(|e| match e {
                    StorageError::Index(reason) => StorageError::invalid_format(name.clone(), reason),
                    other => other,
                })?;
        }

        if index.duplicates > 0 {
            warn!(
                "{} duplicate keys in local indices ignored",
                index.duplicates
            );
        }
        info!(
            "Loaded {} keys from {} index files",
            index.entries.len(),
            index.files
        );
        Ok(index)
    }

    /// Parse one index file and merge its records
    pub fn load_file(&mut self, data: &[u8], cancel: &CancellationToken) -> Result<()> {
        let mut reader = Cursor::new(data);
        let header_size = read_u32_le(&mut reader)?;
        let _header_hash = read_u32_le(&mut reader)?;
        if header_size as usize >= 16 {
            let header = IndexHeader::read(&mut reader)
                .map_err(|e| StorageError::Index(format!("bad header: {e}")))?;
            if header.ekey_length != 9 || header.storage_offset_length != 5 || header.encoded_size_length != 4 {
                return Err(StorageError::Index(format!(
                    "unsupported record layout: key {} location {} size {}",
                    header.ekey_length, header.storage_offset_length, header.encoded_size_length
                )));
            }
        }

        let entries_start = (8 + u64::from(header_size) + 0x0F) & !0x0F;
        reader.seek(SeekFrom::Start(entries_start))?;
        let block_size = read_u32_le(&mut reader)? as usize;
        let _block_hash = read_u32_le(&mut reader)?;

        let available = data.len().saturating_sub(entries_start as usize + 8);
        if block_size > available {
            return Err(StorageError::Index(format!(
                "entry block of {block_size} bytes exceeds the {available} bytes left"
            )));
        }

        for _ in 0..block_size / INDEX_RECORD_SIZE {
            cancel.check()?;
            let record = IndexRecord::read(&mut reader)
                .map_err(|e| StorageError::Index(format!("bad record: {e}")))?;
            if record.key == [0u8; 9] {
                continue;
            }
            let (archive_index, offset) = record.location;
            self.insert(
                TruncatedKey::from_bytes(record.key),
                IndexEntry {
                    archive_index,
                    offset,
                    size: record.size,
                },
            );
        }

        self.files += 1;
        Ok(())
    }

    /// Add a record unless its key is already present
    pub fn insert(&mut self, key: TruncatedKey, entry: IndexEntry) -> bool {
        if self.entries.contains_key(&key) {
            self.duplicates += 1;
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Location of an encoding key
    pub fn get(&self, key: &EncodingKey) -> Option<&IndexEntry> {
        self.entries.get(&key.truncated())
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of index files merged
    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Records dropped because their key was already present
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }
}

fn read_u32_le<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| StorageError::Index(format!("truncated index file: {e}")))?;
    Ok(u32::from_le_bytes(bytes))
}
