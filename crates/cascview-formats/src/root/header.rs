//! Root layout detection
//!
//! Root files come in two layouts. The legacy layout has no header and starts
//! directly with the first block. The manifest layout starts with `MFST`
//! (or `TSFM`, the same magic written little-endian) followed by either
//!
//! ```text
//! total_files u32, named_files u32                                  (classic)
//! header_size u32, version u32, total_files u32, named_files u32    (extended)
//! ```
//!
//! Header fields follow the magic's byte order. Block contents are always
//! little-endian.

use std::io::{Read, Seek, SeekFrom};

use super::error::{Result, RootError};

/// Layout of a root file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLayout {
    /// No header; blocks interleave content keys and name hashes
    Legacy,
    /// `MFST` header; blocks store key and hash arrays separately
    Manifest {
        /// Extended header version, 0 for the classic header
        version: u32,
        /// Total number of files
        total_files: u32,
        /// Files that carry a name hash
        named_files: u32,
    },
}

impl RootLayout {
    /// Detect the layout and leave `reader` at the first block
    pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let start = reader.stream_position()?;
        let mut magic = [0u8; 4];
        if reader.read_exact(&mut magic).is_err() {
            reader.seek(SeekFrom::Start(start))?;
            return Ok(Self::Legacy);
        }

        let little_endian = match &magic {
            b"TSFM" => true,
            b"MFST" => false,
            _ => {
                reader.seek(SeekFrom::Start(start))?;
                return Ok(Self::Legacy);
            }
        };
        let read_u32 = |reader: &mut R| -> Result<u32> {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(if little_endian {
                u32::from_le_bytes(bytes)
            } else {
                u32::from_be_bytes(bytes)
            })
        };

        let first = read_u32(reader)?;
        let second = read_u32(reader)?;

        // An extended header starts with its own small size and a version
        // below it; a classic header starts with the file count.
        if (16..100).contains(&first) && second < 10 && second < first {
            let total_files = read_u32(reader)?;
            let named_files = read_u32(reader)?;
            if named_files > total_files {
                return Err(RootError::InvalidHeader(format!(
                    "{named_files} named files exceed {total_files} total"
                )));
            }
            reader.seek(SeekFrom::Start(start + u64::from(first)))?;
            Ok(Self::Manifest {
                version: second,
                total_files,
                named_files,
            })
        } else {
            if second > first {
                return Err(RootError::InvalidHeader(format!(
                    "{second} named files exceed {first} total"
                )));
            }
            Ok(Self::Manifest {
                version: 0,
                total_files: first,
                named_files: second,
            })
        }
    }

    /// Whether blocks use the 17-byte header with split content flags
    pub const fn has_split_block_header(self) -> bool {
        matches!(self, Self::Manifest { version, .. } if version >= 2)
    }
}
