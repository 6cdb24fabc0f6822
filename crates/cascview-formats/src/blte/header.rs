//! BLTE frame header
//!
//! ```text
//! offset  size  field
//! 0       4     magic "BLTE"
//! 4       4     header size, big-endian (0 = single chunk)
//! -- header size > 0 only --
//! 8       1     marker 0x0F
//! 9       3     chunk count, big-endian
//! 12      24*n  chunk table
//! ```

use binrw::BinRead;
use std::io::{Cursor, Read};

use super::error::{BlteError, BlteResult};

/// BLTE magic bytes
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// Magic plus header size field
pub const BLTE_PREAMBLE_SIZE: u64 = 8;

/// Marker byte in front of the chunk table
pub const CHUNK_TABLE_MARKER: u8 = 0x0F;

const CHUNK_INFO_SIZE: u32 = 24;

/// One row of the chunk table, all fields big-endian
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(big)]
pub struct ChunkInfo {
    /// Stored size including the mode byte
    pub compressed_size: u32,
    /// Size after decoding
    pub decompressed_size: u32,
    /// MD5 of the stored bytes, all zero when absent
    pub checksum: [u8; 16],
}

impl ChunkInfo {
    /// Whether a checksum was declared
    pub fn has_checksum(&self) -> bool {
        self.checksum.iter().any(|&b| b != 0)
    }
}

/// Chunk layout of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlteFrame {
    /// Header size 0: one chunk filling the rest of the container
    Single {
        /// Stored size including the mode byte
        compressed_size: u64,
    },
    /// Explicit chunk table
    Chunked(Vec<ChunkInfo>),
}

impl BlteFrame {
    /// Read the frame header
    ///
    /// `declared_size` is the total container size; it sizes the chunk of a
    /// single-chunk frame.
    pub fn read<R: Read>(reader: &mut R, declared_size: u64) -> BlteResult<Self> {
        let mut preamble = [0u8; 8];
        reader.read_exact(&mut preamble)?;

        let magic = [preamble[0], preamble[1], preamble[2], preamble[3]];
        if magic != BLTE_MAGIC {
            return Err(BlteError::BadMagic(magic));
        }

        let header_size = u32::from_be_bytes([preamble[4], preamble[5], preamble[6], preamble[7]]);
        if header_size == 0 {
            let compressed_size = declared_size
                .checked_sub(BLTE_PREAMBLE_SIZE)
                .ok_or(BlteError::DeclaredSizeTooSmall(declared_size))?;
            return Ok(Self::Single { compressed_size });
        }

        let mut table_head = [0u8; 4];
        reader.read_exact(&mut table_head)?;
        if table_head[0] != CHUNK_TABLE_MARKER {
            return Err(BlteError::BadFrameMarker(table_head[0]));
        }
        let chunk_count = u32::from_be_bytes([0, table_head[1], table_head[2], table_head[3]]);

        let table_size = chunk_count * CHUNK_INFO_SIZE;
        let needed = 12 + u64::from(table_size);
        if u64::from(header_size) < needed {
            return Err(BlteError::BadHeaderSize {
                header_size,
                chunk_count,
            });
        }

        let mut table = vec![0u8; table_size as usize];
        reader.read_exact(&mut table)?;
        let mut cursor = Cursor::new(table);
        let chunks = (0..chunk_count)
            .map(|_| ChunkInfo::read(&mut cursor))
            .collect::<Result<Vec<_>, _>>()?;

        // Skip anything between the chunk table and the first chunk
        let slack = u64::from(header_size) - needed;
        if slack > 0 {
            std::io::copy(&mut reader.by_ref().take(slack), &mut std::io::sink())?;
        }

        Ok(Self::Chunked(chunks))
    }

    /// Number of chunks
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Chunked(chunks) => chunks.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_chunk_size_from_declared() {
        let data = b"BLTE\0\0\0\0Nabc";
        let frame = BlteFrame::read(&mut &data[..], data.len() as u64).unwrap();
        assert_eq!(frame, BlteFrame::Single { compressed_size: 4 });
    }

    #[test]
    fn test_bad_magic() {
        let data = b"BLTF\0\0\0\0N";
        let err = BlteFrame::read(&mut &data[..], 9).unwrap_err();
        assert!(matches!(err, BlteError::BadMagic(m) if &m == b"BLTF"));
    }

    #[test]
    fn test_bad_marker() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&36u32.to_be_bytes());
        data.extend_from_slice(&[0x10, 0, 0, 1]);
        data.extend_from_slice(&[0u8; 24]);
        let err = BlteFrame::read(&mut data.as_slice(), data.len() as u64).unwrap_err();
        assert!(matches!(err, BlteError::BadFrameMarker(0x10)));
    }

    #[test]
    fn test_chunk_table() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&36u32.to_be_bytes());
        data.extend_from_slice(&[0x0F, 0, 0, 1]);
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(&[0xAA; 16]);

        let frame = BlteFrame::read(&mut data.as_slice(), 100).unwrap();
        let BlteFrame::Chunked(chunks) = frame else {
            panic!("expected chunk table");
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].compressed_size, 5);
        assert_eq!(chunks[0].decompressed_size, 4);
        assert!(chunks[0].has_checksum());
    }

    #[test]
    fn test_header_size_too_small() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&[0x0F, 0, 0, 1]);
        data.extend_from_slice(&[0u8; 24]);
        let err = BlteFrame::read(&mut data.as_slice(), 100).unwrap_err();
        assert!(matches!(err, BlteError::BadHeaderSize { .. }));
    }
}
