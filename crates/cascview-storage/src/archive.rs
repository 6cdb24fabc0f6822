//! Local archive files (`Data/data/data.NNN`)
//!
//! Every blob in a data file is preceded by a 30-byte header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 16   | Encoding key (reversed byte order) |
//! | 0x10   | 4    | Size including this 30-byte header (BE) |
//! | 0x14   | 10   | Flags and checksums, not read |
//!
//! File handles are opened on first use and kept until [`DataFiles::close`].

use binrw::BinRead;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

use cascview_crypto::EncodingKey;

use crate::index::IndexEntry;
use crate::{Result, StorageError};

/// Size of the local header in bytes.
pub const LOCAL_HEADER_SIZE: usize = 0x1E;

fn unreverse(mut bytes: [u8; 16]) -> EncodingKey {
    bytes.reverse();
    EncodingKey::from_bytes(bytes)
}

/// Header in front of a blob inside `data.NNN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(big)]
pub struct LocalHeader {
    /// Encoding key of the blob that follows
    #[br(map = unreverse)]
    pub key: EncodingKey,
    /// Total size including this header
    #[br(pad_after = 10)]
    pub size_with_header: u32,
}

impl LocalHeader {
    /// Parse from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(data))
            .map_err(|e| StorageError::Archive(format!("bad local header: {e}")))
    }

    /// Check the header against the key and index entry that led to it
    pub fn check(&self, key: &EncodingKey, entry: &IndexEntry) -> Result<()> {
        if self.key != *key {
            return Err(StorageError::Archive(format!(
                "data.{:03}:{} holds {} instead of {key}",
                entry.archive_index, entry.offset, self.key
            )));
        }
        if self.size_with_header != entry.size {
            return Err(StorageError::Archive(format!(
                "local header size {} does not match index size {}",
                self.size_with_header, entry.size
            )));
        }
        Ok(())
    }
}

/// Lazily opened `data.NNN` files of one installation.
#[derive(Debug)]
pub struct DataFiles {
    dir: PathBuf,
    handles: Mutex<HashMap<u16, File>>,
}

impl DataFiles {
    /// Data files in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Path of `data.NNN`.
    pub fn path_for(&self, archive_index: u16) -> PathBuf {
        self.dir.join(format!("data.{archive_index:03}"))
    }

    /// Read the blob `key` described by `entry`, without its local header.
    ///
    /// Fails when the header names another key or disagrees with the index
    /// entry about the size.
    pub fn read(&self, key: &EncodingKey, entry: &IndexEntry) -> Result<Vec<u8>> {
        if (entry.size as usize) < LOCAL_HEADER_SIZE {
            return Err(StorageError::Archive(format!(
                "entry of {} bytes is smaller than its header",
                entry.size
            )));
        }

        let mut data = vec![0u8; entry.size as usize];
        {
            let mut handles = self.handles.lock();
            let file = match handles.entry(entry.archive_index) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let path = self.path_for(entry.archive_index);
                    trace!("Opening {}", path.display());
                    let file = File::open(&path).map_err(|e| {
                        StorageError::Archive(format!("failed to open {}: {e}", path.display()))
                    })?;
                    slot.insert(file)
                }
            };
            file.seek(SeekFrom::Start(u64::from(entry.offset)))?;
            file.read_exact(&mut data).map_err(|e| {
                StorageError::Archive(format!(
                    "short read of {} bytes at data.{:03}:{}: {e}",
                    entry.size, entry.archive_index, entry.offset
                ))
            })?;
        }

        LocalHeader::parse(&data)?.check(key, entry)?;
        data.drain(..LOCAL_HEADER_SIZE);
        Ok(data)
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().len()
    }

    /// Release every open handle.
    pub fn close(&self) {
        self.handles.lock().clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: [u8; 16] = [
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
        0x1F,
    ];

    fn header_bytes(key: [u8; 16], size_with_header: u32) -> Vec<u8> {
        let mut bytes: Vec<u8> = key.iter().rev().copied().collect();
        bytes.extend_from_slice(&size_with_header.to_be_bytes());
        bytes.extend_from_slice(&[0xAA; 10]);
        bytes
    }

    fn entry(size: u32) -> IndexEntry {
        IndexEntry {
            archive_index: 0,
            offset: 10,
            size,
        }
    }

    #[test]
    fn test_header_key_is_reversed() {
        let header = LocalHeader::parse(&header_bytes(KEY, 1030)).unwrap();
        assert_eq!(header.key, EncodingKey::from_bytes(KEY));
        assert_eq!(header.size_with_header, 1030);
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(
            LocalHeader::parse(&[0u8; 29]),
            Err(StorageError::Archive(_))
        ));
    }

    fn write_archive(dir: &Path, key: [u8; 16], blob: &[u8], header_size: u32) {
        let mut data = vec![0xEEu8; 10];
        data.extend_from_slice(&header_bytes(key, header_size));
        data.extend_from_slice(blob);
        std::fs::write(dir.join("data.000"), data).unwrap();
    }

    #[test]
    fn test_read_strips_header() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), KEY, b"payload", 37);
        let files = DataFiles::new(dir.path());
        let key = EncodingKey::from_bytes(KEY);
        assert_eq!(files.read(&key, &entry(37)).unwrap(), b"payload");
        assert_eq!(files.open_handles(), 1);
        files.close();
        assert_eq!(files.open_handles(), 0);
    }

    #[test]
    fn test_read_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), KEY, b"payload", 99);
        let files = DataFiles::new(dir.path());
        let key = EncodingKey::from_bytes(KEY);
        assert!(matches!(
            files.read(&key, &entry(37)),
            Err(StorageError::Archive(_))
        ));
    }

    #[test]
    fn test_read_rejects_other_key() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), KEY, b"payload", 37);
        let files = DataFiles::new(dir.path());

        // Same 9-byte prefix, different tail
        let mut other = KEY;
        other[15] ^= 0xFF;
        let err = files
            .read(&EncodingKey::from_bytes(other), &entry(37))
            .unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)), "{err}");
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let files = DataFiles::new(dir.path());
        let entry = IndexEntry {
            archive_index: 4,
            offset: 0,
            size: 40,
        };
        assert!(files.read(&EncodingKey::from_bytes(KEY), &entry).is_err());
    }
}
