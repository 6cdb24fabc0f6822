use binrw::BinRead;

use super::error::{EncodingError, EncodingResult};

/// Size of [`EncodingHeader`] on disk
pub const ENCODING_HEADER_SIZE: usize = 22;

/// Encoding file header, all fields big-endian
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct EncodingHeader {
    /// Magic bytes: 'EN'
    pub magic: [u8; 2],
    /// Format version, 1
    pub version: u8,
    /// Content key length
    pub ckey_hash_size: u8,
    /// Encoding key length
    pub ekey_hash_size: u8,
    /// Content key page size in KB
    pub ckey_page_size_kb: u16,
    /// Encoding key page size in KB
    pub ekey_page_size_kb: u16,
    /// Number of content key pages
    pub ckey_page_count: u32,
    /// Number of encoding key pages
    pub ekey_page_count: u32,
    /// Unused, 0
    pub flags: u8,
    /// Size of the ESpec string block
    pub espec_block_size: u32,
}

impl EncodingHeader {
    /// Reject headers this parser cannot read
    pub fn validate(&self) -> EncodingResult<()> {
        if self.magic != *b"EN" {
            return Err(EncodingError::InvalidMagic(self.magic));
        }
        if self.version != 1 {
            return Err(EncodingError::UnsupportedVersion(self.version));
        }
        if self.ckey_hash_size != 16 {
            return Err(EncodingError::UnsupportedKeySize {
                field: "ckey_hash_size",
                value: self.ckey_hash_size,
            });
        }
        if self.ekey_hash_size != 16 {
            return Err(EncodingError::UnsupportedKeySize {
                field: "ekey_hash_size",
                value: self.ekey_hash_size,
            });
        }
        Ok(())
    }

    /// Content key page size in bytes
    pub fn ckey_page_size(&self) -> usize {
        usize::from(self.ckey_page_size_kb) * 1024
    }

    /// Encoding key page size in bytes
    pub fn ekey_page_size(&self) -> usize {
        usize::from(self.ekey_page_size_kb) * 1024
    }
}
